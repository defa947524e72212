//! Generator-tool side of the VibeLink relay.
//!
//! [`ToolClient::start`] connects to the relay and keeps the link up with
//! exponential backoff. Messages from the relay land in an [`Inbox`] for the
//! tool to drain on its own schedule; outbound messages are masked text
//! frames.

mod client;
mod config;
mod session;

pub use client::{Inbox, ToolClient};
pub use config::{ClientConfig, ReconnectConfig};

use vibelink_protocol::{FrameError, HandshakeError};

/// Errors from the tool client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("handshake timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,
}
