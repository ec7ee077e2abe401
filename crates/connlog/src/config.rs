//! Engine configuration.

use std::time::Duration;

/// Default polling interval of a followed file.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default fragment size under which the timestamp search stops narrowing (8 KiB).
pub const DEFAULT_MIN_FRAGMENT_SIZE: u64 = 8 * 1024;

/// Default iteration bound of the timestamp search.
pub const DEFAULT_MAX_SEEK_ITERATIONS: u32 = 1000;

/// Default capacity of line and event channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Configuration shared by all queries of a [`QueryEngine`](crate::QueryEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often a followed file is checked for new data.
    pub poll_interval: Duration,

    /// Byte span under which the timestamp search stops narrowing.
    ///
    /// Smaller values give a tighter lower bound at the cost of more reads.
    /// Default: 8 KiB.
    pub min_fragment_size: u64,

    /// Iterations the timestamp search may perform before it gives up.
    /// Default: 1000.
    pub max_seek_iterations: u32,

    /// Capacity of the bounded channels between readers and consumers.
    ///
    /// A full channel blocks the producing reader. Default: 1024.
    pub channel_capacity: usize,

    /// Upper bound on the shard threads of one parallel query.
    ///
    /// Each parallel query starts `min(shards, workers)` threads of its own.
    /// Default: available parallelism of the host.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            min_fragment_size: DEFAULT_MIN_FRAGMENT_SIZE,
            max_seek_iterations: DEFAULT_MAX_SEEK_ITERATIONS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            workers: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        }
    }
}

impl EngineConfig {
    /// Sets the polling interval of followed files.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the minimum fragment size of the timestamp search.
    pub fn with_min_fragment_size(mut self, size: u64) -> Self {
        self.min_fragment_size = size;
        self
    }

    /// Sets the iteration bound of the timestamp search.
    pub fn with_max_seek_iterations(mut self, iterations: u32) -> Self {
        self.max_seek_iterations = iterations;
        self
    }

    /// Sets the capacity of line and event channels.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Sets the per-query shard thread bound.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.min_fragment_size, 8 * 1024);
        assert_eq!(config.max_seek_iterations, 1000);
        assert_eq!(config.channel_capacity, 1024);
        assert!(config.workers >= 1);
    }

    #[test]
    fn test_engine_config_builder() {
        let config = EngineConfig::default()
            .with_poll_interval(Duration::from_millis(20))
            .with_min_fragment_size(64)
            .with_max_seek_iterations(3)
            .with_channel_capacity(0)
            .with_workers(0);

        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.min_fragment_size, 64);
        assert_eq!(config.max_seek_iterations, 3);
        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.workers, 1);
    }
}
