//! Registry configuration

use std::time::Duration;

use crate::media::gop::DEFAULT_MAX_GOP_SIZE;

/// Stream registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of each stream's broadcast channel, in tags
    pub broadcast_capacity: usize,

    /// Maximum GOP cache size in bytes
    pub max_gop_size: usize,

    /// How long a stream survives its publisher while viewers are attached
    pub publisher_grace_period: Duration,

    /// How long a stream without publisher or viewers is kept
    pub idle_stream_timeout: Duration,

    /// How often the cleanup task runs
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 1024,
            max_gop_size: DEFAULT_MAX_GOP_SIZE,
            publisher_grace_period: Duration::from_secs(10),
            idle_stream_timeout: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(5),
        }
    }
}

impl RegistryConfig {
    /// Set broadcast channel capacity (at least 1)
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    /// Set maximum GOP cache size
    pub fn max_gop_size(mut self, size: usize) -> Self {
        self.max_gop_size = size;
        self
    }

    /// Set publisher grace period
    pub fn publisher_grace_period(mut self, period: Duration) -> Self {
        self.publisher_grace_period = period;
        self
    }

    /// Set idle stream timeout
    pub fn idle_stream_timeout(mut self, timeout: Duration) -> Self {
        self.idle_stream_timeout = timeout;
        self
    }

    /// Set cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
