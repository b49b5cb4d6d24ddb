//! Run tunables and their defaults.

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

use super::retry::RetryPolicy;

/// Minimum allowed worker count.
pub const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
pub const MAX_WORKERS: usize = 1000;

/// Default worker count.
pub const DEFAULT_WORKERS: usize = 5;

/// Completed pages between global cooldowns.
pub const DEFAULT_COOLDOWN_EVERY: u64 = 50;

/// Consecutive tasks per worker between batch delays.
pub const DEFAULT_BATCH_SIZE: u32 = 5;

/// Closed interval a random delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    /// Creates a range. Bounds are not reordered; see [`HarvestConfig::validate`].
    #[must_use]
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Creates a range from millisecond bounds.
    #[must_use]
    pub const fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    /// A range that always yields zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Lower bound.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// `min <= max`.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }

    /// Draws a uniformly random duration from the range.
    ///
    /// An inverted range yields its lower bound.
    #[must_use]
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let lo = duration_millis(self.min);
        let hi = duration_millis(self.max);
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Configuration rejected before a run starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Worker count outside the supported range.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkers {
        /// The rejected value.
        value: usize,
    },

    /// A count that must be positive was zero.
    #[error("{name} must be at least 1")]
    ZeroCount {
        /// Name of the setting.
        name: &'static str,
    },

    /// A delay range with `min > max`.
    #[error("{name} range is inverted: min {min:?} > max {max:?}")]
    InvertedRange {
        /// Name of the setting.
        name: &'static str,
        /// Lower bound.
        min: Duration,
        /// Upper bound.
        max: Duration,
    },
}

/// Tunables for one harvest run.
///
/// `Default` carries the production pacing: 5 workers, 4 attempts per page,
/// a 1-5 s global cooldown every 50 pages, 100-300 ms jitter after each task
/// and a 0.5-1 s pause after every 5 tasks per worker.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Per-page retry policy (also used for discovery).
    pub retry: RetryPolicy,
    /// Completed pages between global cooldowns.
    pub cooldown_every: u64,
    /// Global cooldown duration range.
    pub cooldown: DelayRange,
    /// Per-task jitter range.
    pub task_jitter: DelayRange,
    /// Consecutive tasks per worker between batch delays.
    pub batch_size: u32,
    /// Batch delay range.
    pub batch_delay: DelayRange,
    /// Optional cap on pages scheduled.
    pub page_limit: Option<u32>,
    /// Parent directory of the per-run output directory.
    pub output_dir: PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
            cooldown_every: DEFAULT_COOLDOWN_EVERY,
            cooldown: DelayRange::from_millis(1_000, 5_000),
            task_jitter: DelayRange::from_millis(100, 300),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DelayRange::from_millis(500, 1_000),
            page_limit: None,
            output_dir: PathBuf::from("."),
        }
    }
}

impl HarvestConfig {
    /// Bounded queue capacity: twice the worker count.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.workers.saturating_mul(2).max(1)
    }

    /// Pages to schedule given the discovered total.
    #[must_use]
    pub fn requested_pages(&self, total_pages: u32) -> u32 {
        self.page_limit
            .map_or(total_pages, |limit| limit.min(total_pages))
    }

    /// Rejects out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            return Err(ConfigError::InvalidWorkers {
                value: self.workers,
            });
        }
        if self.cooldown_every == 0 {
            return Err(ConfigError::ZeroCount {
                name: "cooldown threshold",
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroCount { name: "batch size" });
        }
        if self.page_limit == Some(0) {
            return Err(ConfigError::ZeroCount { name: "page limit" });
        }
        for (name, range) in [
            ("cooldown", self.cooldown),
            ("task jitter", self.task_jitter),
            ("batch delay", self.batch_delay),
        ] {
            if !range.is_ordered() {
                return Err(ConfigError::InvertedRange {
                    name,
                    min: range.min(),
                    max: range.max(),
                });
            }
        }
        Ok(())
    }
}
