//! HTTP upgrade handshake (RFC 6455 §4).
//!
//! The server side parses a client's `GET` upgrade request and builds the
//! `101 Switching Protocols` response; the client side builds the request
//! and verifies the server's `Sec-WebSocket-Accept`. Nothing here writes to
//! a socket; callers own the I/O.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::constants::WS_GUID;
use crate::error::HandshakeError;

/// A parsed client upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Request target from the request line (`/` when absent).
    pub path: String,
    /// Value of the `Sec-WebSocket-Key` header.
    pub key: String,
}

/// Computes `Sec-WebSocket-Accept` for a client key.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Reads an HTTP message head (request or response) up to and including the
/// blank line that terminates the headers.
///
/// Bytes after the terminator stay in `reader`, so the same buffered reader
/// can go on to decode frames.
pub async fn read_head<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max: usize,
) -> Result<Vec<u8>, HandshakeError> {
    let mut raw = Vec::with_capacity(512);
    loop {
        let start = raw.len();
        let remaining = (max + 1).saturating_sub(raw.len()) as u64;
        let n = (&mut *reader)
            .take(remaining)
            .read_until(b'\n', &mut raw)
            .await?;
        if n == 0 {
            return Err(HandshakeError::Incomplete);
        }
        if raw.len() > max {
            return Err(HandshakeError::TooLarge { max });
        }

        let line = &raw[start..];
        if line == b"\r\n" || line == b"\n" {
            return Ok(raw);
        }
    }
}

/// Parses a client upgrade request.
///
/// Fails with [`HandshakeError::NotGet`] unless the request line is a `GET`,
/// and with [`HandshakeError::MissingKey`] when `Sec-WebSocket-Key` is absent.
pub fn parse_request(raw: &[u8]) -> Result<UpgradeRequest, HandshakeError> {
    let text = String::from_utf8_lossy(raw);
    let mut lines = text.lines();

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    if !method.eq_ignore_ascii_case("GET") {
        return Err(HandshakeError::NotGet);
    }
    let path = parts.next().unwrap_or("/").to_string();

    let key = header_value(lines, "sec-websocket-key")
        .filter(|k| !k.is_empty())
        .ok_or(HandshakeError::MissingKey)?;

    Ok(UpgradeRequest {
        path,
        key: key.to_string(),
    })
}

/// Builds the `101 Switching Protocols` response for a client key.
pub fn accept_response(client_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(client_key)
    )
}

/// Validates a raw upgrade request and returns the response that completes
/// the upgrade.
pub fn negotiate(raw: &[u8]) -> Result<String, HandshakeError> {
    let request = parse_request(raw)?;
    Ok(accept_response(&request.key))
}

/// Builds the client's upgrade request.
pub fn client_request(host: &str, path: &str, key: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    )
}

/// Checks the server's response to a request sent with `key`.
pub fn verify_response(raw: &[u8], key: &str) -> Result<(), HandshakeError> {
    let text = String::from_utf8_lossy(raw);
    let mut lines = text.lines();

    let status_line = lines.next().unwrap_or_default();
    if status_line.split_whitespace().nth(1) != Some("101") {
        return Err(HandshakeError::BadStatus(status_line.to_string()));
    }

    match header_value(lines, "sec-websocket-accept") {
        Some(accept) if accept == accept_key(key) => Ok(()),
        _ => Err(HandshakeError::AcceptMismatch),
    }
}

/// Finds a header by case-insensitive name, stopping at the blank line.
fn header_value<'a>(lines: impl Iterator<Item = &'a str>, name: &str) -> Option<&'a str> {
    lines.take_while(|l| !l.is_empty()).find_map(|line| {
        let (n, v) = line.split_once(':')?;
        n.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}
