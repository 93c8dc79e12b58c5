//! Pipeline assembly: places the levels on the stage timeline.

use std::fmt::Write as _;

use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::level::{BitmapLevel, Ingress, Level, LevelKind, PriorityBucket, Steering};
use crate::utils::{clog2, join_options};

/// Reference to a level missing from the pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// The level has no successor.
    #[error("level `{level}` has no next level")]
    MissingNext {
        /// Name of the level.
        level: String,
    },

    /// The level has no predecessor.
    #[error("level `{level}` has no previous level")]
    MissingPrev {
        /// Name of the level.
        level: String,
    },
}

/// Assembled pipeline.
///
/// Levels are stored in pipeline order. The ingress level starts at stage 1 (stage 0 registers the inputs) and every
/// level starts at the stage following the last stage of its predecessor.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Config,
    levels: Vec<Level>,
    num_pipeline_stages: usize,
    fl_rd_delay: usize,
}

impl Pipeline {
    /// Creates new pipeline for `config`.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let config = config.validate()?;

        let mut kinds = vec![LevelKind::Ingress(Ingress::new())];
        let mut first_bitmap = 1;
        if config.is_partitioned() {
            let depth = config.steering_depth();
            kinds.push(LevelKind::Steering(Steering::new(depth)));
            first_bitmap = depth + 1;
        }
        kinds.extend((first_bitmap..=config.num_bitmap_levels()).map(|id| LevelKind::Bitmap(BitmapLevel::new(id))));
        kinds.push(LevelKind::PriorityBucket(PriorityBucket::new()));

        let count = kinds.len();
        let mut levels = Vec::with_capacity(count);
        let mut start_cycle = 1;
        for (index, kind) in kinds.into_iter().enumerate() {
            let level = Level {
                index,
                start_cycle,
                prev: index.checked_sub(1),
                next: if index + 1 < count { Some(index + 1) } else { None },
                kind,
            };
            start_cycle = level.end_cycle() + 1;
            tracing::debug!(
                level = %level.name(),
                start = level.start_cycle(),
                end = level.end_cycle(),
                latency = level.latency(),
                sram_bitmap = ?level.as_bitmap().map(BitmapLevel::sram_bitmap),
                sram_counters = ?level.as_bitmap().map(BitmapLevel::sram_counters),
                "placed level"
            );
            levels.push(level);
        }

        // Both ends are always present.
        let first_end = levels.first().map_or(0, Level::end_cycle);
        let last_end = levels.last().map_or(0, Level::end_cycle);
        let num_pipeline_stages = last_end + 1;
        let fl_rd_delay = last_end - first_end - 1;

        tracing::info!(
            levels = levels.len(),
            stages = num_pipeline_stages,
            priorities = config.num_priorities(),
            fl_rd_delay,
            "assembled pipeline"
        );
        Ok(Self { config, levels, num_pipeline_stages, fl_rd_delay })
    }

    /// The generator configuration.
    pub fn config(&self) -> &Config { &self.config }

    /// Levels in pipeline order.
    pub fn levels(&self) -> &[Level] { &self.levels }

    /// Bitmap levels in pipeline order.
    pub fn bitmap_levels(&self) -> impl Iterator<Item = &BitmapLevel> + '_ {
        self.levels.iter().filter_map(Level::as_bitmap)
    }

    /// Bitmap levels together with their placement.
    pub fn placed_bitmap_levels(&self) -> impl Iterator<Item = (&Level, &BitmapLevel)> + '_ {
        self.levels.iter().filter_map(|level| level.as_bitmap().map(|bitmap| (level, bitmap)))
    }

    /// `NUM_PIPELINE_STAGES`: the spillover stage of the priority buckets is the last one.
    pub fn num_pipeline_stages(&self) -> usize { self.num_pipeline_stages }

    /// Number of cycles between the ingress popping the free list and the priority buckets consuming the entry.
    pub fn fl_rd_delay(&self) -> usize { self.fl_rd_delay }

    /// The level preceding the priority buckets, which computes the bucket address.
    pub fn leaf(&self) -> Option<&Level> { self.levels.len().checked_sub(2).and_then(|index| self.levels.get(index)) }

    /// The priority-bucket level.
    pub fn priority_bucket(&self) -> Option<&Level> { self.levels.last() }

    /// Human-readable table of the pipeline structure.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "bbq: {} bitmap level(s), width {}, {} logical partition(s), {} priorities ({}-bit keys)",
            self.config.num_bitmap_levels(),
            self.config.bitmap_width(),
            self.config.num_lps(),
            self.config.num_priorities(),
            clog2(self.config.num_priorities()),
        );
        let _ = writeln!(out, "{:<10}{:>6}{:>6}{:>9}  memory", "level", "start", "end", "latency");
        for level in &self.levels {
            let memory = match level.as_bitmap() {
                Some(bitmap) => join_options(", ", [
                    bitmap.sram_bitmap().then(|| "bitmaps".to_string()),
                    bitmap.sram_counters().then(|| "counters".to_string()),
                ]),
                None if level.is_priority_bucket() => Some("buckets".to_string()),
                None => None,
            };
            let _ = writeln!(
                out,
                "{:<10}{:>6}{:>6}{:>9}  {}",
                level.name(),
                level.start_cycle(),
                level.end_cycle(),
                level.latency(),
                memory.as_deref().unwrap_or("-")
            );
        }
        let _ = write!(
            out,
            "NUM_PIPELINE_STAGES = {}, free-list read delay = {}",
            self.num_pipeline_stages, self.fl_rd_delay
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn cycles(pipeline: &Pipeline) -> Vec<(String, usize, usize)> {
        pipeline.levels().iter().map(|level| (level.name(), level.start_cycle(), level.end_cycle())).collect()
    }

    #[test]
    fn single_level() {
        let pipeline = Pipeline::new(Config::new(1)).unwrap();
        assert_eq!(
            cycles(&pipeline),
            vec![("ingress".to_string(), 1, 1), ("l1".to_string(), 2, 3), ("pb".to_string(), 4, 7)]
        );
        assert_eq!(pipeline.num_pipeline_stages(), 8);
        assert_eq!(pipeline.fl_rd_delay(), 5);
    }

    #[test]
    fn partitioned_leaf_steering() {
        let pipeline = Pipeline::new(Config::new(2).with_bitmap_width(2).with_num_lps(4)).unwrap();
        assert_eq!(
            cycles(&pipeline),
            vec![("ingress".to_string(), 1, 1), ("steering".to_string(), 2, 2), ("pb".to_string(), 3, 6)]
        );
        assert_eq!(pipeline.bitmap_levels().count(), 0);
        assert_eq!(pipeline.fl_rd_delay(), 4);
        match pipeline.levels()[1].kind() {
            LevelKind::Steering(steering) => assert_eq!(steering.depth(), 2),
            kind => panic!("expected steering, found {:?}", kind),
        }
    }

    #[test]
    fn links() {
        let pipeline = Pipeline::new(Config::new(3)).unwrap();
        let levels = pipeline.levels();
        assert_eq!(levels[0].prev(), None);
        assert_eq!(levels[0].next(), Some(1));
        assert_eq!(levels[levels.len() - 1].next(), None);
        assert_eq!(pipeline.leaf().map(Level::name), Some("l3".to_string()));
    }

    #[test]
    fn summary_lists_levels() {
        let summary = Pipeline::new(Config::new(3)).unwrap().summary();
        assert!(summary.contains("l3"));
        assert!(summary.contains("bitmaps, counters"));
        assert!(summary.ends_with("NUM_PIPELINE_STAGES = 15, free-list read delay = 12"));
    }
}
