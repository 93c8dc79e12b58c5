use bbq::level::LevelKind;
use bbq::{generate, Config, ConfigError, GenerateError, Pipeline};
use pretty_assertions::assert_eq;

fn count(text: &str, pred: impl Fn(&str) -> bool) -> usize { text.lines().map(str::trim).filter(|l| pred(l)).count() }

fn assert_balanced(text: &str) {
    assert_eq!(count(text, |l| l.ends_with("begin")), count(text, |l| l == "end"));
    assert_eq!(count(text, |l| l.starts_with("case (")), count(text, |l| l == "endcase"));
    assert_eq!(count(text, |l| l.starts_with("`ifdef")), count(text, |l| l == "`endif"));
}

fn configs() -> Vec<Config> {
    vec![
        Config::new(1),
        Config::new(2),
        Config::new(3),
        Config::new(4),
        Config::new(2).with_bitmap_width(8),
        Config::new(3).with_bitmap_width(4).with_num_lps(4),
        Config::new(4).with_bitmap_width(2).with_num_lps(4),
    ]
}

#[test]
fn output_is_balanced() {
    for config in configs() {
        let text = generate(&config).unwrap();
        assert!(text.starts_with("import heap_ops::*;\n"));
        assert!(text.ends_with("\nendmodule"));
        assert_balanced(&text);
    }
}

#[test]
fn single_level_structure() {
    let text = generate(&Config::new(1)).unwrap();
    assert!(text.contains("    parameter HEAP_BITMAP_WIDTH = 4,\n"));
    assert!(text.contains("localparam NUM_PIPELINE_STAGES"));
    assert!(text.contains("= 8;"));
    assert!(text.contains("logic [HEAP_ENTRY_AWIDTH-1:0] fl_q_r[4:0];"));
    assert!(text.contains("bitmap_t l1_bitmap; // L1 bitmap"));
    assert!(text.contains("counter_t l1_counters[NUM_COUNTERS_L1-1:0]; // L1 counters"));
    assert!(text.contains("assign ready = !rst & (state == FSM_STATE_READY);"));

    // Register-backed level 1 has no SRAMs: only the free list gates readiness.
    assert!(!text.contains("bm_l1_init_done"));
    assert!(!text.contains("counter_l1_init_done"));
    assert!(text.contains("if (fl_init_done_r) begin"));
    assert_eq!(text.matches("bram_simple2port #(").count(), 4);
    assert_eq!(text.matches("ffs #(").count(), 2);
}

#[test]
fn memory_backed_levels() {
    let text = generate(&Config::new(3)).unwrap();
    for memory in ["counter_l2", "counter_l3", "bm_l3"] {
        assert!(text.contains(&format!(" {}_init_done_r;", memory)), "{}", memory);
        assert!(text.contains(&format!("{0}_wraddress_counter_r <= 0;", memory)), "{}", memory);
    }
    assert!(!text.contains("bm_l2_init_done"));
    assert_eq!(text.matches("bram_simple2port #(").count(), 4 + 3);
    assert_eq!(text.matches("ffs #(").count(), 2 + 3 + 3);
    assert!(text.contains("counters_l2 (\n"));
    assert!(text.contains("bm_l3 (\n"));
}

#[test]
fn bitmap_levels_emit_conflict_windows() {
    let text = generate(&Config::new(2)).unwrap();
    for offset in 1..=4 {
        assert!(text.contains(&format!("l2_addr_conflict_s{}_s3 =", 3 + offset)), "offset {}", offset);
    }
    assert!(text.contains("READ_CARRY_DOWN"));
    assert!(text.contains("pb_rdwr_conflict"));
}

#[test]
fn every_level_tracks_its_conflict_window() {
    for config in [
        Config::new(3),
        Config::new(4),
        Config::new(3).with_bitmap_width(4).with_num_lps(4),
        Config::new(4).with_bitmap_width(2).with_num_lps(4),
    ] {
        let text = generate(&config).unwrap();
        let pipeline = Pipeline::new(config).unwrap();
        let levels = pipeline.levels();

        for level in levels {
            if !matches!(level.kind(), LevelKind::Bitmap(_) | LevelKind::Steering(_)) {
                continue;
            }
            let next = &levels[level.next().unwrap()];
            let stage = level.end_cycle();
            for offset in 1..=4 {
                let wire = format!("{}_addr_conflict_s{}_s{}", next.name(), stage + offset, stage);
                assert!(text.contains(&format!("{} = (", wire)), "{:?}: {}", config, wire);
                assert!(text.contains(&format!("reg_{0} <= {0};", wire)), "{:?}: {}", config, wire);
            }
        }

        let pb = levels.last().unwrap();
        assert_eq!(pb.name(), "pb");
        for cycle in [pb.start_cycle(), pb.start_cycle() + 1] {
            for ahead in 1..=2 {
                let shift = format!(
                    "reg_pb_addr_conflict_s{}_s{} <= reg_pb_addr_conflict_s{}_s{};",
                    cycle + ahead,
                    cycle,
                    cycle - 1 + ahead,
                    cycle - 1
                );
                assert!(text.contains(&shift), "{:?}: {}", config, shift);
            }
        }
    }
}

#[test]
fn partitioned_ports_and_occupancy() {
    let text = generate(&Config::new(3).with_bitmap_width(4).with_num_lps(4)).unwrap();
    assert!(text.contains("localparam HEAP_NUM_LPS = 4, // Number of logical BBQs"));
    assert!(text.contains("counter_t occupancy[HEAP_NUM_LPS-1:0];"));
    assert!(text.contains("typedef logic [HEAP_LOGICAL_BBQ_AWIDTH-1:0] bbq_id_t;"));
    assert!(text.contains("reg_bbq_id_s[0] <= bbq_id_s0;"));
    assert!(!text.contains("parameter HEAP_BITMAP_WIDTH"));
}

#[test]
fn init_conditions_are_chunked() {
    let text = generate(&Config::new(4)).unwrap();
    // Free list first, then every level's bitmaps before its counters.
    let expected = "\
if (fl_init_done_r & counter_l2_init_done_r & bm_l3_init_done_r &
            counter_l3_init_done_r & bm_l4_init_done_r & counter_l4_init_done_r) begin";
    assert!(text.contains(expected), "{}", expected);
}

#[test]
fn invalid_configuration_produces_no_text() {
    assert_eq!(
        generate(&Config::new(2).with_num_lps(4)),
        Err(GenerateError::Config(ConfigError::MissingBitmapWidth { num_lps: 4 }))
    );
}
