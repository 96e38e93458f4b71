//! Byte-stream transport used by subscriber sessions
//!
//! A session never touches a socket directly. Everything goes through the
//! [`Transport`] capability trait, which also keeps the cumulative byte
//! counters that liveness detection relies on.
//!
//! Implementations must tolerate `close()` racing an in-flight `write()`
//! from another task, and must report a write issued after close as an
//! ordinary `io::Error` rather than panicking.

pub mod stream;

use std::future::Future;
use std::io;

pub use stream::IoTransport;

/// Cumulative transport counters
///
/// Both sums are monotonically non-decreasing for the life of the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStat {
    /// Total bytes read from the peer
    pub read_bytes_sum: u64,
    /// Total bytes written to the peer
    pub wrote_bytes_sum: u64,
}

/// Connection-like object driven by a session
pub trait Transport: Send + Sync + 'static {
    /// Read available bytes into `buf`. `Ok(0)` means the peer closed.
    fn read(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Write all of `buf`
    fn write(&self, buf: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Close the transport. Calling this more than once is harmless.
    fn close(&self) -> impl Future<Output = io::Result<()>> + Send;

    /// Remote endpoint, for diagnostics
    fn remote_addr(&self) -> &str;

    /// Current cumulative counters
    fn stat(&self) -> TransportStat;
}
