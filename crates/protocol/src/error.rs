//! Error types for the wire protocol.

/// Errors produced while reading or decoding a WebSocket frame.
///
/// Every variant ends the connection; the relay never tries to resync a
/// broken stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame payload too large: {len} bytes (max {max})")]
    TooLarge { len: u64, max: usize },
}

/// Errors produced during the HTTP upgrade handshake.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed before the request headers were complete")]
    Incomplete,

    #[error("upgrade request exceeds {max} bytes")]
    TooLarge { max: usize },

    #[error("not a GET request")]
    NotGet,

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("unexpected upgrade status line: {0}")]
    BadStatus(String),

    #[error("Sec-WebSocket-Accept does not match the request key")]
    AcceptMismatch,
}
