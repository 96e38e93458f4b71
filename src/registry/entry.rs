//! Stream entry and state types
//!
//! This module defines the per-stream state stored in the registry.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use tokio::sync::broadcast;

use crate::media::flv::FlvTag;
use crate::media::gop::GopCache;

use super::config::RegistryConfig;

/// State of a stream entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Stream has an active publisher
    Active,
    /// Publisher disconnected, within grace period
    GracePeriod,
    /// No publisher, waiting for cleanup
    Idle,
}

/// Entry for a single stream in the registry
pub struct StreamEntry {
    /// Catch-up data for late joiners
    pub gop_cache: GopCache,

    /// Current publisher's ID (None if no publisher)
    pub publisher_id: Option<u64>,

    /// Broadcast sender for fan-out to subscribers
    pub(super) tx: broadcast::Sender<FlvTag>,

    /// Number of active subscribers
    pub subscriber_count: AtomicU32,

    /// When the publisher disconnected (for grace period tracking)
    pub publisher_disconnected_at: Option<Instant>,

    /// When the stream was created
    pub created_at: Instant,

    /// Current stream state
    pub state: StreamState,
}

impl StreamEntry {
    pub(super) fn new(config: &RegistryConfig) -> Self {
        let (tx, _) = broadcast::channel(config.broadcast_capacity);

        Self {
            gop_cache: GopCache::with_max_size(config.max_gop_size),
            publisher_id: None,
            tx,
            subscriber_count: AtomicU32::new(0),
            publisher_disconnected_at: None,
            created_at: Instant::now(),
            state: StreamState::Idle,
        }
    }

    /// Get the number of subscribers
    pub fn subscriber_count(&self) -> u32 {
        self.subscriber_count.load(Ordering::Relaxed)
    }

    /// Check if the stream has an active publisher
    pub fn has_publisher(&self) -> bool {
        self.publisher_id.is_some()
    }

    /// Tags a new subscriber needs before live data
    pub fn get_catchup_tags(&self) -> Vec<FlvTag> {
        self.gop_cache.get_catchup_data()
    }

    pub(super) fn subscribe(&self) -> broadcast::Receiver<FlvTag> {
        self.tx.subscribe()
    }

    /// Send a tag to all subscribers
    ///
    /// Returns the number of receivers, 0 when nobody is listening.
    pub(super) fn send(&self, tag: FlvTag) -> usize {
        self.tx.send(tag).unwrap_or(0)
    }
}

/// Statistics for a stream
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Number of active subscribers
    pub subscriber_count: u32,
    /// Whether the stream has an active publisher
    pub has_publisher: bool,
    /// Current stream state
    pub state: StreamState,
    /// Number of tags in the GOP cache
    pub gop_frame_count: usize,
    /// Size of the GOP cache in bytes
    pub gop_size_bytes: usize,
}
