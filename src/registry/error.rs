//! Registry error types

use super::frame::StreamKey;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Stream not found
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamKey),
    /// Stream already has a publisher
    #[error("Stream already has a publisher: {0}")]
    StreamAlreadyPublishing(StreamKey),
    /// Stream is not active (no publisher and not in grace period)
    #[error("Stream not active: {0}")]
    StreamNotActive(StreamKey),
}
