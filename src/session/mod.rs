//! Subscriber session management
//!
//! A session is a single viewer connection. It owns its transport, knows
//! which stream the viewer asked for, and tracks how much it has delivered.

pub mod subscriber;
pub mod unique_key;

pub use subscriber::SubscriberSession;
pub use unique_key::{gen_unique_key, UniqueKeyPrefix};
