//! Generator configuration.

use thiserror::Error;

use crate::utils::{exact_log, is_pow2};

/// Bitmap width used when none is given.
pub const DEFAULT_BITMAP_WIDTH: usize = 4;

/// Configuration error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The tree must have at least one bitmap level.
    #[error("the number of bitmap levels must be at least 1")]
    NoBitmapLevels,

    /// Logical partitioning needs an explicit bitmap width.
    #[error("logical partitioning ({num_lps} partitions) requires an explicit bitmap width")]
    MissingBitmapWidth {
        /// Requested number of partitions.
        num_lps: usize,
    },

    /// The bitmap width must be a power of two, at least 2.
    #[error("bitmap width must be a power of two no less than 2, got {width}")]
    InvalidBitmapWidth {
        /// Requested width.
        width: usize,
    },

    /// The number of partitions must be a power of the bitmap width.
    #[error("the number of logical partitions ({num_lps}) must be a power of the bitmap width ({width})")]
    LpsNotPowerOfWidth {
        /// Requested number of partitions.
        num_lps: usize,
        /// Bitmap width.
        width: usize,
    },

    /// More partitions than priority buckets.
    #[error("{num_lps} logical partitions exceed the {num_priorities} priority buckets")]
    TooManyLps {
        /// Requested number of partitions.
        num_lps: usize,
        /// Total number of priority buckets.
        num_priorities: usize,
    },

    /// `width^levels` does not fit in a machine word.
    #[error("{width}^{levels} priority buckets overflow")]
    TooManyPriorities {
        /// Bitmap width.
        width: usize,
        /// Number of bitmap levels.
        levels: usize,
    },
}

/// Generator configuration.
///
/// Build with [`Config::new`] and the `with_*` methods, then [`Config::validate`] before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    num_bitmap_levels: usize,
    bitmap_width: Option<usize>,
    num_lps: usize,
}

impl Config {
    /// Creates new configuration with `num_bitmap_levels` levels, no partitioning, and the default width.
    pub fn new(num_bitmap_levels: usize) -> Self { Self { num_bitmap_levels, bitmap_width: None, num_lps: 1 } }

    /// Sets the bitmap width.
    pub fn with_bitmap_width(self, width: usize) -> Self { Self { bitmap_width: Some(width), ..self } }

    /// Sets the number of logical partitions.
    pub fn with_num_lps(self, num_lps: usize) -> Self { Self { num_lps, ..self } }

    /// Checks the configuration, returning it unchanged if it is consistent.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.num_bitmap_levels == 0 {
            return Err(ConfigError::NoBitmapLevels);
        }
        if let Some(width) = self.bitmap_width {
            if width < 2 || !is_pow2(width) {
                return Err(ConfigError::InvalidBitmapWidth { width });
            }
        }

        let width = self.bitmap_width();
        let levels = self.num_bitmap_levels;
        let num_priorities = u32::try_from(levels)
            .ok()
            .and_then(|levels| width.checked_pow(levels))
            .ok_or(ConfigError::TooManyPriorities { width, levels })?;

        if self.num_lps > 1 {
            if self.bitmap_width.is_none() {
                return Err(ConfigError::MissingBitmapWidth { num_lps: self.num_lps });
            }
            if exact_log(width, self.num_lps).is_none() {
                return Err(ConfigError::LpsNotPowerOfWidth { num_lps: self.num_lps, width });
            }
        }
        if self.num_lps == 0 {
            return Err(ConfigError::LpsNotPowerOfWidth { num_lps: 0, width });
        }
        if self.num_lps > num_priorities {
            return Err(ConfigError::TooManyLps { num_lps: self.num_lps, num_priorities });
        }
        Ok(self)
    }

    /// Number of bitmap levels in the full tree.
    pub fn num_bitmap_levels(&self) -> usize { self.num_bitmap_levels }

    /// Bitmap width (tree fan-out).
    pub fn bitmap_width(&self) -> usize { self.bitmap_width.unwrap_or(DEFAULT_BITMAP_WIDTH) }

    /// Number of logical partitions.
    pub fn num_lps(&self) -> usize { self.num_lps }

    /// Whether the queue is split into several logical partitions.
    pub fn is_partitioned(&self) -> bool { self.num_lps > 1 }

    /// Total number of priority buckets, `width^levels`. Saturates on unvalidated configurations.
    pub fn num_priorities(&self) -> usize {
        (0..self.num_bitmap_levels).fold(1usize, |acc, _| acc.saturating_mul(self.bitmap_width()))
    }

    /// Number of priority buckets owned by each logical partition.
    pub fn num_priorities_per_lp(&self) -> usize { self.num_priorities() / self.num_lps.max(1) }

    /// Number of top bitmap levels subsumed by steering, `log_width(num_lps)`.
    pub fn steering_depth(&self) -> usize { exact_log(self.bitmap_width(), self.num_lps).unwrap_or(0) }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new(2).validate().unwrap();
        assert_eq!(config.bitmap_width(), 4);
        assert_eq!(config.num_priorities(), 16);
        assert!(!config.is_partitioned());
        assert_eq!(config.steering_depth(), 0);
    }

    #[test]
    fn partitioned() {
        let config = Config::new(3).with_bitmap_width(4).with_num_lps(16).validate().unwrap();
        assert_eq!(config.num_priorities(), 64);
        assert_eq!(config.num_priorities_per_lp(), 4);
        assert_eq!(config.steering_depth(), 2);
    }

    #[test]
    fn rejects() {
        assert_eq!(Config::new(0).validate(), Err(ConfigError::NoBitmapLevels));
        assert_eq!(Config::new(2).with_num_lps(4).validate(), Err(ConfigError::MissingBitmapWidth { num_lps: 4 }));
        assert_eq!(Config::new(2).with_bitmap_width(6).validate(), Err(ConfigError::InvalidBitmapWidth { width: 6 }));
        assert_eq!(Config::new(2).with_bitmap_width(1).validate(), Err(ConfigError::InvalidBitmapWidth { width: 1 }));
        assert_eq!(
            Config::new(2).with_bitmap_width(4).with_num_lps(8).validate(),
            Err(ConfigError::LpsNotPowerOfWidth { num_lps: 8, width: 4 })
        );
        assert_eq!(
            Config::new(1).with_bitmap_width(2).with_num_lps(4).validate(),
            Err(ConfigError::TooManyLps { num_lps: 4, num_priorities: 2 })
        );
        assert!(matches!(Config::new(200).validate(), Err(ConfigError::TooManyPriorities { .. })));
    }
}
