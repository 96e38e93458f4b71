//! Statistics for HTTP-FLV sessions

pub mod tracker;

pub use tracker::{StatTracker, SubscriberStat, PROTOCOL_HTTP_FLV};
