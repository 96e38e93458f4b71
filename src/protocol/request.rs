//! HTTP request header reading
//!
//! A subscriber sends a single `GET` request and then only reads. We pull
//! bytes off the transport until the blank line that ends the header block,
//! refusing blocks larger than a configured limit. Anything the viewer sends
//! after the terminator is ignored.

use std::collections::HashMap;
use std::io;

use bytes::BytesMut;

use crate::error::{Error, Result};
use crate::protocol::constants::HEADER_READ_CHUNK;
use crate::transport::Transport;

/// Request line plus header fields of an inbound request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeader {
    /// First line, without the line terminator
    pub request_line: String,
    /// Header name to value, names kept as sent
    pub headers: HashMap<String, String>,
}

/// Tokenized request line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: &'a str,
    pub target: &'a str,
    pub version: &'a str,
}

/// Read the request line and header block from `transport`
///
/// Fails on transport error, on EOF before the terminating blank line, and
/// when the block grows beyond `max_size` bytes.
pub async fn read_http_header<T: Transport>(
    transport: &T,
    max_size: usize,
) -> Result<RequestHeader> {
    let mut buf = BytesMut::with_capacity(HEADER_READ_CHUNK);
    let mut chunk = [0u8; HEADER_READ_CHUNK];

    loop {
        if let Some(end) = find_header_end(&buf) {
            if end > max_size {
                return Err(Error::BadRequest("header block too large"));
            }
            return parse_header_block(&buf[..end]);
        }
        if buf.len() >= max_size {
            return Err(Error::BadRequest("header block too large"));
        }

        let n = transport.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before end of request header",
            )));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Split a request line into method, target and version
///
/// Exactly three single-space separated tokens are accepted.
pub fn parse_request_line(line: &str) -> Result<RequestLine<'_>> {
    let mut parts = line.split(' ');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version), None)
            if !method.is_empty() && !target.is_empty() && !version.is_empty() =>
        {
            Ok(RequestLine {
                method,
                target,
                version,
            })
        }
        _ => Err(Error::BadRequest("malformed request line")),
    }
}

/// Offset just past the blank line ending the header block, if present
///
/// Lines may end in `\r\n` or a bare `\n`.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    let mut start = 0;
    while let Some(pos) = buf[start..].iter().position(|&b| b == b'\n') {
        let line = &buf[start..start + pos];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return Some(start + pos + 1);
        }
        start += pos + 1;
    }
    None
}

fn parse_header_block(block: &[u8]) -> Result<RequestHeader> {
    let text =
        std::str::from_utf8(block).map_err(|_| Error::BadRequest("header is not valid utf-8"))?;

    let mut lines = text.lines();
    let request_line = match lines.next() {
        Some(line) if !line.is_empty() => line.to_string(),
        _ => return Err(Error::BadRequest("missing request line")),
    };

    let mut headers = HashMap::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or(Error::BadRequest("malformed header line"))?;
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }

    Ok(RequestHeader {
        request_line,
        headers,
    })
}
