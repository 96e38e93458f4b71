//! # httpflv-rs
//!
//! HTTP-FLV live stream delivery for tokio.
//!
//! A viewer opens a plain HTTP GET such as `GET /live/room1.flv?token=abc`.
//! The server answers with a chunk-less, keep-open response whose body is an
//! FLV file that never ends: the FLV header, the stream's metadata and
//! sequence headers, the current GOP, then live tags as they are published.
//!
//! ```text
//!  publisher ─► StreamRegistry::broadcast(tag)
//!                        │ (broadcast channel, GOP cache)
//!                        ▼
//!  HttpFlvServer ─► SubscriberSession ─► Transport ─► viewer
//!                        ▲
//!                   monitor: update_stat / is_alive
//! ```
//!
//! # Example
//!
//! ```no_run
//! use httpflv_rs::{HttpFlvServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> httpflv_rs::Result<()> {
//!     let server = HttpFlvServer::new(ServerConfig::default(), ());
//!     // Publish with server.registry().register_publisher / broadcast
//!     server.run().await
//! }
//! ```

pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
pub use media::{FlvReader, FlvTag, FlvTagType, FLV_HEADER};
pub use protocol::StreamIdentity;
pub use registry::{StreamKey, StreamRegistry};
pub use server::{HttpFlvServer, ServerConfig, SubscriberHandler};
pub use session::SubscriberSession;
pub use stats::SubscriberStat;
pub use transport::{IoTransport, Transport, TransportStat};
