//! Stream identity extraction
//!
//! A subscribe request looks like:
//!
//! ```text
//! GET /{app}/{stream}.flv[?query] HTTP/1.1
//! ```
//!
//! The path is percent-decoded, must end in `.flv` and contain exactly two
//! non-root segments. Dot segments are not resolved and `\` is not a
//! separator. Only the part of the last segment before its first `.` is the
//! stream name. The query is kept verbatim for the consumer to interpret.
//!
//! Every rejection maps to [`Error::BadRequest`]; the reason is only there
//! for logs.

use std::borrow::Cow;
use std::fmt;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::constants::{FLV_EXTENSION, READ_METHOD};
use crate::protocol::request::parse_request_line;

/// Routable identity of a subscribe request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamIdentity {
    /// Application name (first path segment)
    pub app_name: String,
    /// Stream name (last path segment up to its first `.`)
    pub stream_name: String,
    /// Raw query string without the leading `?`, possibly empty
    pub raw_query: String,
    /// The request target exactly as sent, path and query included
    pub stream_name_with_raw_query: String,
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.stream_name)
    }
}

/// Parse a request line into a [`StreamIdentity`]
pub fn parse_identity(request_line: &str) -> Result<StreamIdentity> {
    let line = parse_request_line(request_line)?;
    if line.method != READ_METHOD {
        return Err(Error::BadRequest("method not allowed"));
    }

    let (raw_path, raw_query) = split_target(line.target)?;
    let path = decode_path(raw_path)?;
    if !path.ends_with(FLV_EXTENSION) {
        return Err(Error::BadRequest("path does not end with .flv"));
    }

    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() != 3 {
        return Err(Error::BadRequest("unexpected number of path segments"));
    }

    let app_name = segments[1];
    let parts: Vec<&str> = segments[2].split('.').collect();
    if parts.len() < 2 {
        return Err(Error::BadRequest("malformed stream segment"));
    }
    let stream_name = parts[0];

    if app_name.is_empty() || stream_name.is_empty() {
        return Err(Error::BadRequest("empty app or stream name"));
    }

    Ok(StreamIdentity {
        app_name: app_name.to_string(),
        stream_name: stream_name.to_string(),
        raw_query: raw_query.to_string(),
        stream_name_with_raw_query: line.target.to_string(),
    })
}

/// Split a request target into its raw path and raw query
///
/// Origin form (`/a/b.flv?q`) is cut as is. Absolute form must parse as a
/// URL with a host; path and query are still cut from the text as sent, so
/// nothing is normalized or re-encoded. A fragment is dropped.
fn split_target(target: &str) -> Result<(&str, &str)> {
    if target.bytes().any(|b| b.is_ascii_control()) {
        return Err(Error::BadRequest("control character in url"));
    }

    let target = target.split_once('#').map_or(target, |(t, _)| t);
    let path_and_query = if target.starts_with('/') {
        target
    } else {
        let url = Url::parse(target).map_err(|_| Error::BadRequest("malformed url"))?;
        if !url.has_host() {
            return Err(Error::BadRequest("malformed url"));
        }
        let (_, authority_and_rest) = target
            .split_once("://")
            .ok_or(Error::BadRequest("malformed url"))?;
        match authority_and_rest.find(|c: char| c == '/' || c == '?') {
            Some(i) => &authority_and_rest[i..],
            None => "",
        }
    };

    Ok(path_and_query
        .split_once('?')
        .unwrap_or((path_and_query, "")))
}

/// Percent-decode a raw path, rejecting malformed escapes and non UTF-8 results
fn decode_path(raw: &str) -> Result<Cow<'_, str>> {
    let bytes = raw.as_bytes();
    for (i, _) in raw.match_indices('%') {
        match bytes.get(i + 1..i + 3) {
            Some(hex) if hex.iter().all(u8::is_ascii_hexdigit) => {}
            _ => return Err(Error::BadRequest("malformed percent escape")),
        }
    }

    percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| Error::BadRequest("path is not valid utf-8"))
}
