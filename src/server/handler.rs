//! Application callbacks for subscriber sessions
//!
//! Implement [`SubscriberHandler`] to authorize viewers or track them. All
//! methods have defaults, so `()` works as an accept-everything handler.

use std::future::Future;

use tokio::net::TcpStream;

use crate::session::SubscriberSession;
use crate::transport::IoTransport;

/// Session type the server hands to its handler
pub type TcpSubscriberSession = SubscriberSession<IoTransport<TcpStream>>;

/// Hooks invoked by [`HttpFlvServer`](super::HttpFlvServer)
pub trait SubscriberHandler: Send + Sync + 'static {
    /// Called once the request has been parsed, before anything is written
    ///
    /// The session's identity, query and headers are available. Returning
    /// `false` disposes the session without a response.
    fn on_subscribe(&self, session: &TcpSubscriberSession) -> impl Future<Output = bool> + Send {
        let _ = session;
        async { true }
    }

    /// Called after a session that passed `on_subscribe` has been disposed
    fn on_session_closed(&self, session: &TcpSubscriberSession) -> impl Future<Output = ()> + Send {
        let _ = session;
        async {}
    }
}

impl SubscriberHandler for () {}
