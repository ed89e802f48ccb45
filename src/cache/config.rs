//! Snapshot cache configuration.
//!
//! Resolved from the `[cache]` section of `snapcache.toml`.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1000;
const DEFAULT_COLLECT_MIN_GEN_DELTA: u64 = 8;
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;

/// Where revision pruning runs once a generation is no longer observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneMode {
    /// On the thread that released the last snapshot of a generation.
    #[default]
    Inline,
    /// On a periodic sweeper task.
    Background,
}

impl FromStr for PruneMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(PruneMode::Inline),
            "background" => Ok(PruneMode::Background),
            other => Err(format!("expected `inline` or `background`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on waiting for the write section.
    pub write_timeout: Duration,
    pub prune_mode: PruneMode,
    /// Sweeper cadence in background mode.
    pub sweep_interval: Duration,
    /// Generation lag behind the floor that makes a commit wake the sweeper early.
    pub collect_min_gen_delta: u64,
    /// Bound of the change-feed channel.
    pub channel_capacity: usize,
    /// Maximum change batches applied per consumer wakeup.
    pub consume_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            prune_mode: PruneMode::Inline,
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
            collect_min_gen_delta: DEFAULT_COLLECT_MIN_GEN_DELTA,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            write_timeout: settings.write_timeout,
            prune_mode: settings.prune_mode,
            sweep_interval: settings.sweep_interval,
            collect_min_gen_delta: settings.collect_min_gen_delta,
            channel_capacity: settings.channel_capacity.get(),
            consume_batch_limit: settings.consume_batch_limit.get(),
        }
    }
}

impl CacheConfig {
    pub fn prunes_inline(&self) -> bool {
        self.prune_mode == PruneMode::Inline
    }

    /// Channel capacity clamped to at least one slot.
    pub fn channel_capacity_non_zero(&self) -> usize {
        self.channel_capacity.max(1)
    }

    /// Batch limit clamped to at least one batch per wakeup.
    pub fn consume_batch_limit_non_zero(&self) -> usize {
        self.consume_batch_limit.max(1)
    }
}
