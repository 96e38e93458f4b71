//! HTTP-FLV server
//!
//! Accepts viewer connections, runs a [`SubscriberSession`](crate::session::SubscriberSession)
//! per connection and relays tags from the [`StreamRegistry`](crate::registry::StreamRegistry).

pub mod config;
mod connection;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use handler::{SubscriberHandler, TcpSubscriberSession};
pub use listener::HttpFlvServer;
