//! Per-connection subscriber flow
//!
//! ```text
//!  TcpStream ──► IoTransport ──► SubscriberSession::read_request()
//!                                        │
//!                         handler.on_subscribe() ─► registry.subscribe()
//!                                        │
//!         preamble + FLV header + catch-up tags ─► relay live tags
//!                                        │
//!     stream ended / viewer hung up / monitor disposed ─► dispose()
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};

use crate::media::flv::FlvTag;
use crate::registry::{StreamKey, StreamRegistry};
use crate::session::SubscriberSession;
use crate::transport::IoTransport;

use super::config::ServerConfig;
use super::handler::{SubscriberHandler, TcpSubscriberSession};

/// Sessions currently relaying, by unique key
pub(crate) type SessionTable = Arc<RwLock<HashMap<String, Arc<TcpSubscriberSession>>>>;

pub(crate) struct Connection<H: SubscriberHandler> {
    config: ServerConfig,
    handler: Arc<H>,
    registry: Arc<StreamRegistry>,
    sessions: SessionTable,
}

impl<H: SubscriberHandler> Connection<H> {
    pub(crate) fn new(
        config: ServerConfig,
        handler: Arc<H>,
        registry: Arc<StreamRegistry>,
        sessions: SessionTable,
    ) -> Self {
        Self {
            config,
            handler,
            registry,
            sessions,
        }
    }

    /// Drive one viewer connection to completion
    pub(crate) async fn run(self, socket: TcpStream) {
        let transport = match IoTransport::from_tcp(socket) {
            Ok(t) => t.with_write_timeout(self.config.write_timeout),
            Err(e) => {
                tracing::debug!(error = %e, "Peer gone before session start");
                return;
            }
        };

        let mut session = SubscriberSession::new(transport)
            .with_max_header_size(self.config.max_header_size)
            .with_request_timeout(self.config.read_request_timeout);

        // Failures are logged and the session disposed by read_request
        if session.read_request().await.is_err() {
            return;
        }

        let key = match session.identity() {
            Some(identity) => StreamKey::from(identity),
            None => {
                session.dispose().await;
                return;
            }
        };

        if !self.handler.on_subscribe(&session).await {
            tracing::info!(
                session = %session.unique_key(),
                stream = %key,
                "Subscriber rejected by handler"
            );
            session.dispose().await;
            return;
        }

        let session = Arc::new(session);
        match self.registry.subscribe(&key).await {
            Ok((rx, catchup)) => {
                session.set_fresh(false);
                self.sessions
                    .write()
                    .await
                    .insert(session.unique_key().to_owned(), Arc::clone(&session));

                relay(&session, rx, catchup).await;

                self.registry.unsubscribe(&key).await;
                self.sessions.write().await.remove(session.unique_key());
            }
            Err(e) => {
                tracing::info!(
                    session = %session.unique_key(),
                    stream = %key,
                    error = %e,
                    "Subscribe failed"
                );
            }
        }

        session.dispose().await;
        self.handler.on_session_closed(&session).await;
    }
}

/// Send the stream start, then live tags until one side goes away
async fn relay(
    session: &TcpSubscriberSession,
    mut rx: broadcast::Receiver<FlvTag>,
    catchup: Vec<FlvTag>,
) {
    session.write_http_response_header().await;
    session.write_flv_header().await;
    for tag in &catchup {
        session.write_tag(tag).await;
    }

    let forward = async {
        // After a lag, video resumes at the next keyframe
        let mut skip_to_keyframe = false;
        loop {
            match rx.recv().await {
                Ok(tag) => {
                    if session.is_disposed() {
                        break;
                    }
                    if skip_to_keyframe && tag.is_video() {
                        if !tag.is_keyframe() {
                            continue;
                        }
                        skip_to_keyframe = false;
                    }
                    session.write_tag(&tag).await;
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        session = %session.unique_key(),
                        missed = missed,
                        "Subscriber lagging, skipping to next keyframe"
                    );
                    skip_to_keyframe = true;
                }
                Err(RecvError::Closed) => {
                    tracing::debug!(session = %session.unique_key(), "Stream ended");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = forward => {}
        result = session.run_loop() => match result {
            Ok(()) => tracing::debug!(session = %session.unique_key(), "Viewer closed connection"),
            Err(e) => tracing::debug!(session = %session.unique_key(), error = %e, "Viewer connection ended"),
        },
    }
}
