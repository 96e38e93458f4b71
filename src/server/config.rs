//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::*;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Time a viewer has to send its complete request (None = no limit)
    pub read_request_timeout: Option<Duration>,

    /// Bound on a single write to a viewer (None = no limit)
    ///
    /// A viewer that stays over this limit stops making write progress and
    /// is picked up by the liveness monitor.
    pub write_timeout: Option<Duration>,

    /// Maximum size of the request line plus headers
    pub max_header_size: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Interval of bitrate updates and liveness checks
    pub monitor_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            read_request_timeout: Some(Duration::from_secs(10)),
            write_timeout: Some(Duration::from_secs(10)),
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            tcp_nodelay: true, // Important for low latency
            monitor_interval: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the request read timeout
    pub fn read_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_request_timeout = timeout;
        self
    }

    /// Set the per-write timeout
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the maximum request header size
    pub fn max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size;
        self
    }

    /// Set the monitor interval, rounded up to whole seconds
    pub fn monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = Duration::from_secs(interval.as_secs().max(1));
        self
    }

    /// Monitor interval as the whole-second count the session stats expect
    pub(crate) fn monitor_interval_secs(&self) -> u32 {
        u32::try_from(self.monitor_interval.as_secs())
            .unwrap_or(u32::MAX)
            .max(1)
    }
}
