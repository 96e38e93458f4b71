//! Error types
//!
//! Every protocol-level failure while reading a viewer's request collapses
//! into [`Error::BadRequest`]. The reason string is diagnostic context only
//! and is not meant to be matched on.

use std::io;
use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport read/write/close failure
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The request could not be turned into a stream identity
    #[error("bad http-flv request: {0}")]
    BadRequest(&'static str),

    /// The viewer did not finish sending its request in time
    #[error("request not received within {0:?}")]
    Timeout(Duration),

    /// Malformed FLV data
    #[error("invalid flv data: {0}")]
    InvalidFlv(&'static str),
}

impl Error {
    /// Whether this error is a protocol rejection rather than an I/O failure
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Error::BadRequest(_))
    }
}
