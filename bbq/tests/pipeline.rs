use bbq::level::Level;
use bbq::{Config, ConfigError, Pipeline};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Valid configurations: width `2^k`, up to 4 levels, and a partition count that is a power of the width.
fn configs() -> impl Strategy<Value = Config> {
    (1usize..=3, 1usize..=4).prop_flat_map(|(log_width, levels)| {
        let width = 1 << log_width;
        (0..=levels).prop_map(move |depth| {
            let config = Config::new(levels).with_bitmap_width(width);
            if depth == 0 {
                config
            } else {
                config.with_num_lps(width.pow(depth as u32))
            }
        })
    })
}

#[test]
fn three_levels() {
    let pipeline = Pipeline::new(Config::new(3)).unwrap();
    let ranges = pipeline.levels().iter().map(|l| (l.name(), l.start_cycle(), l.end_cycle())).collect::<Vec<_>>();
    assert_eq!(
        ranges,
        vec![
            ("ingress".to_string(), 1, 1),
            ("l1".to_string(), 2, 3),
            ("l2".to_string(), 4, 6),
            ("l3".to_string(), 7, 10),
            ("pb".to_string(), 11, 14),
        ]
    );
    assert_eq!(pipeline.num_pipeline_stages(), 15);
    assert_eq!(pipeline.fl_rd_delay(), 12);
}

#[test]
fn steering_subsumes_partitioned_levels() {
    let pipeline = Pipeline::new(Config::new(3).with_bitmap_width(4).with_num_lps(4)).unwrap();
    let names = pipeline.levels().iter().map(Level::name).collect::<Vec<_>>();
    assert_eq!(names, vec!["ingress", "steering", "l2", "l3", "pb"]);
    assert_eq!(pipeline.config().num_priorities_per_lp(), 16);
}

#[test]
fn invalid_configuration_fails_before_assembly() {
    assert_eq!(Pipeline::new(Config::new(0)).unwrap_err(), ConfigError::NoBitmapLevels);
    assert_eq!(
        Pipeline::new(Config::new(2).with_bitmap_width(4).with_num_lps(2)).unwrap_err(),
        ConfigError::LpsNotPowerOfWidth { num_lps: 2, width: 4 }
    );
}

proptest! {
    #[test]
    fn stages_are_contiguous(config in configs()) {
        let pipeline = Pipeline::new(config).unwrap();
        let levels = pipeline.levels();
        prop_assert_eq!(levels[0].start_cycle(), 1);
        for pair in levels.windows(2) {
            prop_assert_eq!(pair[1].start_cycle(), pair[0].end_cycle() + 1);
            prop_assert_eq!(pair[1].prev(), Some(pair[0].index()));
            prop_assert_eq!(pair[0].next(), Some(pair[1].index()));
        }
        let last = &levels[levels.len() - 1];
        prop_assert!(last.is_priority_bucket());
        prop_assert_eq!(last.end_cycle(), pipeline.num_pipeline_stages() - 1);
    }

    #[test]
    fn buckets_split_evenly(config in configs()) {
        let config = config.validate().unwrap();
        let width = config.bitmap_width();
        prop_assert_eq!(config.num_priorities(), width.pow(config.num_bitmap_levels() as u32));
        prop_assert_eq!(config.num_priorities_per_lp() * config.num_lps(), config.num_priorities());
    }
}
