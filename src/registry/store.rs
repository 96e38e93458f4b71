//! Stream registry implementation
//!
//! The central registry that manages all live streams and fans tags out
//! from publishers to HTTP-FLV subscribers.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, RwLock};

use crate::media::flv::FlvTag;

use super::config::RegistryConfig;
use super::entry::{StreamEntry, StreamState, StreamStats};
use super::error::RegistryError;
use super::frame::StreamKey;

/// Central registry for all live streams
///
/// Thread-safe via `RwLock`. Read-heavy workloads (subscriber count checks,
/// broadcasting) benefit from the concurrent read access.
pub struct StreamRegistry {
    streams: RwLock<HashMap<StreamKey, Arc<RwLock<StreamEntry>>>>,
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a publisher for a stream
    ///
    /// If the stream doesn't exist, it will be created.
    /// If the stream exists and is in grace period, the publisher reclaims it.
    /// Returns an error if the stream already has an active publisher.
    pub async fn register_publisher(
        &self,
        key: &StreamKey,
        publisher_id: u64,
    ) -> Result<(), RegistryError> {
        let mut streams = self.streams.write().await;

        if let Some(entry_arc) = streams.get(key) {
            let mut entry = entry_arc.write().await;

            if entry.state == StreamState::Active && entry.publisher_id.is_some() {
                return Err(RegistryError::StreamAlreadyPublishing(key.clone()));
            }

            entry.publisher_id = Some(publisher_id);
            entry.publisher_disconnected_at = None;
            entry.state = StreamState::Active;

            tracing::info!(
                stream = %key,
                publisher_id = publisher_id,
                subscribers = entry.subscriber_count(),
                "Publisher registered (existing stream)"
            );
        } else {
            let mut entry = StreamEntry::new(&self.config);
            entry.publisher_id = Some(publisher_id);
            entry.state = StreamState::Active;

            streams.insert(key.clone(), Arc::new(RwLock::new(entry)));

            tracing::info!(
                stream = %key,
                publisher_id = publisher_id,
                "Publisher registered (new stream)"
            );
        }

        Ok(())
    }

    /// Unregister a publisher from a stream
    ///
    /// The stream enters grace period if there are active subscribers,
    /// allowing the publisher to reconnect.
    pub async fn unregister_publisher(&self, key: &StreamKey, publisher_id: u64) {
        let streams = self.streams.read().await;

        if let Some(entry_arc) = streams.get(key) {
            let mut entry = entry_arc.write().await;

            if entry.publisher_id != Some(publisher_id) {
                tracing::warn!(
                    stream = %key,
                    expected = ?entry.publisher_id,
                    actual = publisher_id,
                    "Publisher unregister mismatch"
                );
                return;
            }

            entry.publisher_id = None;
            entry.publisher_disconnected_at = Some(Instant::now());
            entry.gop_cache.clear();

            if entry.subscriber_count() > 0 {
                entry.state = StreamState::GracePeriod;
                tracing::info!(
                    stream = %key,
                    publisher_id = publisher_id,
                    subscribers = entry.subscriber_count(),
                    grace_period_secs = self.config.publisher_grace_period.as_secs(),
                    "Publisher disconnected, entering grace period"
                );
            } else {
                entry.state = StreamState::Idle;
                tracing::info!(
                    stream = %key,
                    publisher_id = publisher_id,
                    "Publisher disconnected, no subscribers"
                );
            }
        }
    }

    /// Subscribe to a stream
    ///
    /// Returns a broadcast receiver and the catch-up tags a new viewer must
    /// get first (metadata, sequence headers, current GOP).
    pub async fn subscribe(
        &self,
        key: &StreamKey,
    ) -> Result<(broadcast::Receiver<FlvTag>, Vec<FlvTag>), RegistryError> {
        let streams = self.streams.read().await;

        let entry_arc = streams
            .get(key)
            .ok_or_else(|| RegistryError::StreamNotFound(key.clone()))?;

        let entry = entry_arc.read().await;

        // Allow subscription during grace period (publisher might reconnect)
        if entry.state == StreamState::Idle && entry.publisher_id.is_none() {
            return Err(RegistryError::StreamNotActive(key.clone()));
        }

        let rx = entry.subscribe();
        let catchup = entry.get_catchup_tags();

        entry.subscriber_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            stream = %key,
            subscribers = entry.subscriber_count(),
            catchup_tags = catchup.len(),
            "Subscriber added"
        );

        Ok((rx, catchup))
    }

    /// Unsubscribe from a stream
    pub async fn unsubscribe(&self, key: &StreamKey) {
        let streams = self.streams.read().await;

        if let Some(entry_arc) = streams.get(key) {
            let entry = entry_arc.read().await;
            let prev = entry
                .subscriber_count
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                    Some(n.saturating_sub(1))
                })
                .unwrap_or(0);

            tracing::debug!(
                stream = %key,
                subscribers = prev.saturating_sub(1),
                "Subscriber removed"
            );
        }
    }

    /// Broadcast a tag to all subscribers of a stream
    ///
    /// Also feeds the GOP cache. Returns the number of receivers reached.
    pub async fn broadcast(&self, key: &StreamKey, tag: FlvTag) -> usize {
        let streams = self.streams.read().await;

        if let Some(entry_arc) = streams.get(key) {
            let mut entry = entry_arc.write().await;
            entry.gop_cache.push(&tag);
            entry.send(tag)
        } else {
            0
        }
    }

    /// Check if a stream exists and has an active publisher
    pub async fn has_active_stream(&self, key: &StreamKey) -> bool {
        let streams = self.streams.read().await;

        if let Some(entry_arc) = streams.get(key) {
            let entry = entry_arc.read().await;
            entry.state == StreamState::Active && entry.publisher_id.is_some()
        } else {
            false
        }
    }

    /// Check if a stream exists (active or in grace period)
    pub async fn stream_exists(&self, key: &StreamKey) -> bool {
        let streams = self.streams.read().await;

        if let Some(entry_arc) = streams.get(key) {
            let entry = entry_arc.read().await;
            matches!(entry.state, StreamState::Active | StreamState::GracePeriod)
        } else {
            false
        }
    }

    /// Get stream statistics
    pub async fn get_stream_stats(&self, key: &StreamKey) -> Option<StreamStats> {
        let streams = self.streams.read().await;

        let entry_arc = streams.get(key)?;
        let entry = entry_arc.read().await;
        Some(StreamStats {
            subscriber_count: entry.subscriber_count(),
            has_publisher: entry.has_publisher(),
            state: entry.state,
            gop_frame_count: entry.gop_cache.frame_count(),
            gop_size_bytes: entry.gop_cache.size(),
        })
    }

    /// Get total number of streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Run cleanup once
    ///
    /// Removes streams that have:
    /// - Been in grace period longer than `publisher_grace_period`
    /// - Been idle longer than `idle_stream_timeout`
    ///
    /// Dropping an entry closes its broadcast channel, which ends the relay
    /// loop of every remaining subscriber.
    pub async fn cleanup(&self) {
        let mut streams = self.streams.write().await;
        let now = Instant::now();

        let keys_to_remove: Vec<StreamKey> = streams
            .iter()
            .filter_map(|(key, entry_arc)| {
                // Skip entries that are busy rather than block the whole map
                let entry = entry_arc.try_read().ok()?;
                let since = entry.publisher_disconnected_at.unwrap_or(entry.created_at);
                let expired = match entry.state {
                    StreamState::GracePeriod => {
                        now.duration_since(since) > self.config.publisher_grace_period
                    }
                    StreamState::Idle => now.duration_since(since) > self.config.idle_stream_timeout,
                    StreamState::Active => false,
                };
                expired.then(|| key.clone())
            })
            .collect();

        for key in keys_to_remove {
            streams.remove(&key);
            tracing::info!(stream = %key, "Stream removed by cleanup");
        }
    }

    /// Spawn background cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.cleanup().await;
            }
        })
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
