//! Media handling for HTTP-FLV
//!
//! This module provides:
//! - The FLV file header written to every subscriber
//! - FLV tag encoding and parsing
//! - Sequential reading of FLV byte streams
//! - GOP caching for late-joiner support

pub mod flv;
pub mod gop;

pub use flv::{FlvReader, FlvTag, FlvTagType, FLV_HEADER};
pub use gop::GopCache;
