//! HTTP-FLV subscriber session
//!
//! One viewer connection, from request parsing to disposal:
//!
//! ```text
//!  accept ──► new() ──► read_request() ──┬──► (error) dispose()
//!                                        │
//!                                        ▼
//!             write_http_response_header(), write_flv_header(),
//!             write_tag() ... ──► dispose()
//! ```
//!
//! Writes are best-effort. They never report failure to the caller; a
//! viewer whose writes stop landing is found by [`SubscriberSession::is_alive`]
//! and torn down by whoever owns the session. `read_request` is the only
//! operation that returns an error, and it disposes the session before doing
//! so.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::media::flv::{FlvTag, FLV_HEADER};
use crate::protocol::constants::DEFAULT_MAX_HEADER_SIZE;
use crate::protocol::identity::{parse_identity, StreamIdentity};
use crate::protocol::request::read_http_header;
use crate::protocol::response::HTTP_RESPONSE_HEADER;
use crate::stats::{StatTracker, SubscriberStat};
use crate::transport::Transport;

use super::unique_key::{gen_unique_key, UniqueKeyPrefix};

/// A single viewer of a live FLV stream
///
/// Request parsing needs `&mut self`; once the request is parsed the session
/// is normally shared behind an `Arc` between the relay task and a monitor,
/// and every remaining operation takes `&self`.
pub struct SubscriberSession<T: Transport> {
    unique_key: String,
    transport: T,
    identity: Option<StreamIdentity>,
    headers: HashMap<String, String>,
    is_fresh: AtomicBool,
    start_tick: Option<Instant>,
    max_header_size: usize,
    request_timeout: Option<Duration>,
    disposed: AtomicBool,
    stat: Mutex<StatTracker>,
}

impl<T: Transport> SubscriberSession<T> {
    /// Create a session for an accepted transport
    pub fn new(transport: T) -> Self {
        let unique_key = gen_unique_key(UniqueKeyPrefix::FlvSubSession);
        let stat = SubscriberStat::new(unique_key.clone(), transport.remote_addr());

        tracing::info!(
            session = %unique_key,
            peer = %transport.remote_addr(),
            "lifecycle new httpflv SubscriberSession"
        );

        Self {
            unique_key,
            transport,
            identity: None,
            headers: HashMap::new(),
            is_fresh: AtomicBool::new(true),
            start_tick: None,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            request_timeout: None,
            disposed: AtomicBool::new(false),
            stat: Mutex::new(StatTracker::new(stat)),
        }
    }

    /// Limit the size of the request header block
    pub fn with_max_header_size(mut self, max: usize) -> Self {
        self.max_header_size = max;
        self
    }

    /// Limit how long the viewer may take to send its request
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read the viewer's request and derive the stream identity
    ///
    /// Must be called once, before any write. On failure the session is
    /// already disposed when this returns and nothing has been written.
    pub async fn read_request(&mut self) -> Result<()> {
        self.start_tick = Some(Instant::now());

        let result = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.parse_request())
                .await
                .unwrap_or_else(|_| Err(Error::Timeout(limit))),
            None => self.parse_request().await,
        };

        if let Err(ref e) = result {
            tracing::warn!(
                session = %self.unique_key,
                peer = %self.transport.remote_addr(),
                error = %e,
                "Failed to read http-flv request"
            );
            self.dispose().await;
        }

        result
    }

    async fn parse_request(&mut self) -> Result<()> {
        let header = read_http_header(&self.transport, self.max_header_size).await?;
        self.headers = header.headers;

        let identity = parse_identity(&header.request_line)?;
        tracing::debug!(
            session = %self.unique_key,
            stream = %identity,
            query = %identity.raw_query,
            "Request parsed"
        );
        self.identity = Some(identity);

        Ok(())
    }

    /// Block until the viewer hangs up or the transport fails
    ///
    /// Anything the viewer sends after its request is discarded. Returns
    /// `Ok(())` on a clean close by the viewer.
    pub async fn run_loop(&self) -> Result<()> {
        let mut buf = [0u8; 128];
        loop {
            if self.transport.read(&mut buf).await? == 0 {
                return Ok(());
            }
        }
    }

    /// Write the fixed HTTP response preamble
    pub async fn write_http_response_header(&self) {
        tracing::debug!(session = %self.unique_key, "> W http response header");
        self.write_raw_packet(HTTP_RESPONSE_HEADER).await;
    }

    /// Write the FLV file header
    pub async fn write_flv_header(&self) {
        tracing::debug!(session = %self.unique_key, "> W http flv header");
        self.write_raw_packet(&FLV_HEADER).await;
    }

    /// Write one encoded FLV tag as is
    pub async fn write_tag(&self, tag: &FlvTag) {
        self.write_raw_packet(tag.raw()).await;
    }

    /// Best-effort write of raw bytes
    ///
    /// Errors are not returned. A viewer that stopped accepting data shows
    /// up as a write counter that stops moving.
    pub async fn write_raw_packet(&self, pkt: &[u8]) {
        if self.is_disposed() {
            return;
        }
        if let Err(e) = self.transport.write(pkt).await {
            tracing::trace!(session = %self.unique_key, error = %e, "Write failed");
        }
    }

    /// Close the transport. Only the first call has any effect.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::info!(session = %self.unique_key, "lifecycle dispose httpflv SubscriberSession");
        if let Err(e) = self.transport.close().await {
            tracing::debug!(session = %self.unique_key, error = %e, "Transport close failed");
        }
    }

    /// Whether `dispose()` has been called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Current statistics, counters taken from the transport
    pub fn get_stat(&self) -> SubscriberStat {
        self.tracker().snapshot(self.transport.stat())
    }

    /// Recompute the bitrate; call once per `interval_secs`
    pub fn update_stat(&self, interval_secs: u32) {
        let current = self.transport.stat();
        self.tracker().update_bitrate(current, interval_secs);
    }

    /// Whether the session wrote anything since the previous call
    pub fn is_alive(&self, interval_secs: u32) -> bool {
        let current = self.transport.stat();
        self.tracker().is_alive(current, interval_secs)
    }

    fn tracker(&self) -> MutexGuard<'_, StatTracker> {
        self.stat.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remote endpoint of the viewer
    pub fn remote_addr(&self) -> &str {
        self.transport.remote_addr()
    }

    /// Process-wide unique key, `FLVSUB<n>`
    pub fn unique_key(&self) -> &str {
        &self.unique_key
    }

    /// Parsed identity, `None` until `read_request` succeeds
    pub fn identity(&self) -> Option<&StreamIdentity> {
        self.identity.as_ref()
    }

    /// Application name from the request path
    pub fn app_name(&self) -> Option<&str> {
        self.identity.as_ref().map(|id| id.app_name.as_str())
    }

    /// Stream name from the request path, extension removed
    pub fn stream_name(&self) -> Option<&str> {
        self.identity.as_ref().map(|id| id.stream_name.as_str())
    }

    /// Query string as sent, without the leading `?`
    pub fn raw_query(&self) -> Option<&str> {
        self.identity.as_ref().map(|id| id.raw_query.as_str())
    }

    /// Request target as sent, path and query included
    pub fn stream_name_with_raw_query(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .map(|id| id.stream_name_with_raw_query.as_str())
    }

    /// Request headers, empty until the request has been read
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// When request parsing started
    pub fn start_tick(&self) -> Option<Instant> {
        self.start_tick
    }

    /// True until the owning server starts relaying to this session
    pub fn is_fresh(&self) -> bool {
        self.is_fresh.load(Ordering::Acquire)
    }

    /// Mark the session as claimed (`false`) or unclaimed for relaying
    pub fn set_fresh(&self, fresh: bool) {
        self.is_fresh.store(fresh, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::IoTransport;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn session_pair() -> (SubscriberSession<IoTransport<DuplexStream>>, DuplexStream) {
        let (local, peer) = tokio::io::duplex(64 * 1024);
        let session = SubscriberSession::new(IoTransport::new(local, "192.168.1.10:51000"));
        (session, peer)
    }

    async fn parsed_session(
        request: &[u8],
    ) -> (SubscriberSession<IoTransport<DuplexStream>>, DuplexStream) {
        let (mut session, mut peer) = session_pair();
        peer.write_all(request).await.unwrap();
        session.read_request().await.unwrap();
        (session, peer)
    }

    #[tokio::test]
    async fn test_new_session() {
        let (session, _peer) = session_pair();

        assert!(session.unique_key().starts_with("FLVSUB"));
        assert!(session.is_fresh());
        assert!(session.identity().is_none());
        assert!(session.app_name().is_none());
        assert!(session.start_tick().is_none());
        assert!(session.headers().is_empty());
        assert_eq!(session.remote_addr(), "192.168.1.10:51000");
    }

    #[tokio::test]
    async fn test_read_request_success() {
        let (session, _peer) = parsed_session(
            b"GET /live/test123.flv?token=abc HTTP/1.1\r\nHost: example.com\r\n\r\n",
        )
        .await;

        assert_eq!(session.app_name(), Some("live"));
        assert_eq!(session.stream_name(), Some("test123"));
        assert_eq!(session.raw_query(), Some("token=abc"));
        assert_eq!(
            session.stream_name_with_raw_query(),
            Some("/live/test123.flv?token=abc")
        );
        assert_eq!(session.headers()["Host"], "example.com");
        assert!(session.start_tick().is_some());
        assert!(session.is_fresh());
        assert!(!session.is_disposed());
    }

    #[tokio::test]
    async fn test_wrong_method_disposes_without_writing() {
        let (mut session, mut peer) = session_pair();
        peer.write_all(b"POST /live/test.flv HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let err = session.read_request().await.unwrap_err();
        assert!(err.is_bad_request());
        assert!(session.is_disposed());
        assert!(session.identity().is_none());

        let mut written = Vec::new();
        peer.read_to_end(&mut written).await.unwrap();
        assert!(written.is_empty());
        assert_eq!(session.get_stat().wrote_bytes_sum, 0);
    }

    #[tokio::test]
    async fn test_bad_path_disposes() {
        let (mut session, mut peer) = session_pair();
        peer.write_all(b"GET /badpath HTTP/1.1\r\n\r\n").await.unwrap();

        assert!(session.read_request().await.unwrap_err().is_bad_request());
        assert!(session.is_disposed());
        assert!(session.stream_name().is_none());
    }

    #[tokio::test]
    async fn test_eof_before_request_disposes() {
        let (mut session, mut peer) = session_pair();
        peer.write_all(b"GET /live/test.flv HTTP/1.1\r\n").await.unwrap();
        drop(peer);

        let err = session.read_request().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(session.is_disposed());
    }

    #[tokio::test]
    async fn test_request_timeout_disposes() {
        let (local, _peer) = tokio::io::duplex(1024);
        let mut session = SubscriberSession::new(IoTransport::new(local, "peer"))
            .with_request_timeout(Some(Duration::from_millis(30)));

        let err = session.read_request().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(session.is_disposed());
    }

    #[tokio::test]
    async fn test_oversized_request_rejected() {
        let (local, mut peer) = tokio::io::duplex(64 * 1024);
        let mut session =
            SubscriberSession::new(IoTransport::new(local, "peer")).with_max_header_size(128);

        let request = format!("GET /live/{}.flv HTTP/1.1\r\n\r\n", "a".repeat(512));
        peer.write_all(request.as_bytes()).await.unwrap();

        assert!(session.read_request().await.unwrap_err().is_bad_request());
        assert!(session.is_disposed());
    }

    #[tokio::test]
    async fn test_write_sequence() {
        let (session, mut peer) = parsed_session(b"GET /live/s.flv HTTP/1.1\r\n\r\n").await;
        let tag = FlvTag::video(0, &[0x17, 0x01, 0x00, 0x00, 0x00]).unwrap();

        session.write_http_response_header().await;
        session.write_flv_header().await;
        session.write_tag(&tag).await;

        let expected_len = HTTP_RESPONSE_HEADER.len() + FLV_HEADER.len() + tag.raw().len();
        let mut written = vec![0u8; expected_len];
        peer.read_exact(&mut written).await.unwrap();

        assert_eq!(&written[..HTTP_RESPONSE_HEADER.len()], HTTP_RESPONSE_HEADER);
        let rest = &written[HTTP_RESPONSE_HEADER.len()..];
        assert_eq!(&rest[..FLV_HEADER.len()], &FLV_HEADER);
        assert_eq!(&rest[FLV_HEADER.len()..], &tag.raw()[..]);

        assert_eq!(session.get_stat().wrote_bytes_sum, expected_len as u64);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let (session, _peer) = parsed_session(b"GET /live/s.flv HTTP/1.1\r\n\r\n").await;

        session.dispose().await;
        session.dispose().await;
        assert!(session.is_disposed());
        // Diagnostics remain available
        assert_eq!(session.remote_addr(), "192.168.1.10:51000");
    }

    #[tokio::test]
    async fn test_write_after_dispose_is_noop() {
        let (session, _peer) = parsed_session(b"GET /live/s.flv HTTP/1.1\r\n\r\n").await;

        session.dispose().await;
        session.write_http_response_header().await;
        session.write_raw_packet(b"more").await;

        assert_eq!(session.get_stat().wrote_bytes_sum, 0);
    }

    #[tokio::test]
    async fn test_liveness_through_session() {
        let (session, mut peer) = parsed_session(b"GET /live/s.flv HTTP/1.1\r\n\r\n").await;

        assert!(session.is_alive(5));
        assert!(!session.is_alive(5));

        session.write_raw_packet(&[0u8; 10]).await;
        assert!(session.is_alive(5));
        assert!(!session.is_alive(5));

        let mut buf = [0u8; 10];
        peer.read_exact(&mut buf).await.unwrap();
    }

    #[tokio::test]
    async fn test_bitrate_through_session() {
        let (session, mut peer) = parsed_session(b"GET /live/s.flv HTTP/1.1\r\n\r\n").await;

        let payload = vec![0u8; 10_240];
        session.write_raw_packet(&payload).await;
        session.update_stat(10);

        let stat = session.get_stat();
        assert_eq!(stat.bitrate, 8);
        assert_eq!(stat.wrote_bytes_sum, 10_240);
        assert!(stat.read_bytes_sum > 0);

        let mut buf = vec![0u8; 10_240];
        peer.read_exact(&mut buf).await.unwrap();
    }

    #[tokio::test]
    async fn test_freshness_flag() {
        let (session, _peer) = parsed_session(b"GET /live/s.flv HTTP/1.1\r\n\r\n").await;
        let session = Arc::new(session);

        assert!(session.is_fresh());
        session.set_fresh(false);
        assert!(!session.is_fresh());
    }

    #[tokio::test]
    async fn test_run_loop_ends_on_viewer_close() {
        let (session, mut peer) = parsed_session(b"GET /live/s.flv HTTP/1.1\r\n\r\n").await;

        peer.write_all(b"ignored").await.unwrap();
        drop(peer);

        assert!(session.run_loop().await.is_ok());
    }

    #[tokio::test]
    async fn test_run_loop_ends_on_dispose() {
        let (session, _peer) = parsed_session(b"GET /live/s.flv HTTP/1.1\r\n\r\n").await;
        let session = Arc::new(session);

        let reader = Arc::clone(&session);
        let handle = tokio::spawn(async move { reader.run_loop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        session.dispose().await;

        assert!(handle.await.unwrap().is_err());
    }
}
