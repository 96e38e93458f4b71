//! Stream keys
//!
//! Tags themselves travel through the registry as [`FlvTag`](crate::media::FlvTag),
//! which is cheap to clone: every subscriber shares the same encoded bytes.

use std::fmt;

use crate::protocol::identity::StreamIdentity;

/// Unique identifier for a stream (app + stream name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    /// Application name (e.g., "live")
    pub app: String,
    /// Stream name (e.g., "test123")
    pub name: String,
}

impl StreamKey {
    /// Create a new stream key
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
        }
    }
}

impl From<&StreamIdentity> for StreamKey {
    fn from(identity: &StreamIdentity) -> Self {
        Self::new(identity.app_name.as_str(), identity.stream_name.as_str())
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app, self.name)
    }
}
