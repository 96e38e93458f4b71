//! Stream registry for pub/sub routing
//!
//! The registry manages live streams and routes FLV tags from publishers to
//! HTTP-FLV subscribers. It uses `tokio::sync::broadcast` for fan-out.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌─────────────────────────┐
//!                     │ streams: HashMap<Key,   │
//!                     │   StreamEntry {         │
//!                     │     gop_cache,          │
//!                     │     tx: broadcast::Tx,  │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]            [Subscriber]            [Subscriber]
//!    broadcast(tag)         rx.recv()               rx.recv()
//!         │                       │                       │
//!         └──► registry.broadcast()──► write_tag() ──► TCP
//! ```
//!
//! # Zero-Copy Design
//!
//! An [`FlvTag`](crate::media::FlvTag) holds its encoded bytes in a
//! `bytes::Bytes`, so every subscriber writes the same allocation.

pub mod config;
pub mod entry;
pub mod error;
pub mod frame;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{StreamEntry, StreamState, StreamStats};
pub use error::RegistryError;
pub use frame::StreamKey;
pub use store::StreamRegistry;
