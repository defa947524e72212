//! Tool connection lifecycle: upgrade handshake, read loop, write pump.
//!
//! ```text
//! Connecting -> Handshaking -> Open -> Closing -> Closed
//!                    |                               ^
//!                    +------ handshake failure ------+
//! ```
//!
//! A connection only enters the registry once its handshake response has
//! been written, and leaves it when its read loop ends.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vibelink_protocol::constants::{HANDSHAKE_TIMEOUT, MAX_FRAME_PAYLOAD, MAX_HANDSHAKE_SIZE};
use vibelink_protocol::frame::{self, Opcode};
use vibelink_protocol::handshake;

use crate::SEND_BUFFER_SIZE;
use crate::queue::{PendingAction, Producer};
use crate::registry::Registry;

/// Encoded frame, shared by every connection a broadcast reaches.
pub(crate) type FrameBytes = Arc<[u8]>;

/// Server-assigned connection identifier, unique per server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle stage of a tool connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Open,
    Closing,
    Closed,
}

/// Error returned when a frame cannot be queued for a connection.
#[derive(Debug, thiserror::Error)]
#[error("send failed: buffer full or connection closed")]
pub struct SendError;

/// An open tool connection.
///
/// Shared between its handler task, the registry, and pending actions.
/// Sends never block: frames go through a bounded channel drained by the
/// connection's write pump.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    tx: mpsc::Sender<FrameBytes>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Connection {
    fn new(
        id: ConnectionId,
        peer_addr: SocketAddr,
        tx: mpsc::Sender<FrameBytes>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer_addr,
            tx,
            cancel,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Queues an already encoded frame.
    pub(crate) fn send_frame(&self, frame: FrameBytes) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            debug!(conn = %self.id, "send on closed connection");
            return Err(SendError);
        }
        self.tx.try_send(frame).map_err(|e| {
            match e {
                TrySendError::Full(_) => {
                    warn!(conn = %self.id, "send buffer full, dropping frame");
                }
                TrySendError::Closed(_) => {
                    debug!(conn = %self.id, "send on closed connection");
                }
            }
            SendError
        })
    }

    /// Queues `text` as a server text frame.
    pub fn send_text(&self, text: &str) -> Result<(), SendError> {
        self.send_frame(frame::encode_text(text.as_bytes()).into())
    }

    /// Returns `false` once the connection was closed or its write pump
    /// stopped (socket gone).
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Closes the connection; its read loop and write pump stop promptly.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.cancel();
        true
    }

    /// Builds a socket-less connection whose outbound frames land in the
    /// returned receiver.
    #[cfg(test)]
    pub(crate) fn detached(id: u64, capacity: usize) -> (Arc<Self>, mpsc::Receiver<FrameBytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Self::new(
            ConnectionId(id),
            SocketAddr::from(([127, 0, 0, 1], 0)),
            tx,
            CancellationToken::new(),
        );
        (Arc::new(conn), rx)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Drives one accepted socket from handshake to close.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    id: ConnectionId,
    registry: Arc<Registry>,
    actions: Producer<PendingAction>,
    server_cancel: CancellationToken,
) {
    let cancel = server_cancel.child_token();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    debug!(conn = %id, %peer_addr, state = ?ConnectionState::Handshaking, "awaiting upgrade request");
    let head = tokio::select! {
        _ = cancel.cancelled() => return,
        result = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            handshake::read_head(&mut reader, MAX_HANDSHAKE_SIZE),
        ) => match result {
            Ok(Ok(head)) => head,
            Ok(Err(e)) => {
                debug!(conn = %id, %peer_addr, "handshake failed: {e}");
                return;
            }
            Err(_) => {
                debug!(conn = %id, %peer_addr, "handshake timed out");
                return;
            }
        }
    };

    let response = match handshake::negotiate(&head) {
        Ok(response) => response,
        Err(e) => {
            debug!(conn = %id, %peer_addr, state = ?ConnectionState::Closed, "handshake rejected: {e}");
            return;
        }
    };
    if let Err(e) = write_half.write_all(response.as_bytes()).await {
        debug!(conn = %id, %peer_addr, "failed to write handshake response: {e}");
        return;
    }

    let (tx, rx) = mpsc::channel(SEND_BUFFER_SIZE);
    let conn = Arc::new(Connection::new(id, peer_addr, tx, cancel.clone()));
    tokio::spawn(write_pump(write_half, rx, cancel.clone(), id));

    // stop() may have cleared the registry while we were handshaking.
    if cancel.is_cancelled() {
        conn.close();
        return;
    }
    registry.add(Arc::clone(&conn));
    info!(conn = %id, %peer_addr, state = ?ConnectionState::Open, "tool connected");

    read_loop(&mut reader, &conn, &actions, &cancel).await;

    debug!(conn = %id, state = ?ConnectionState::Closing, "closing connection");
    registry.remove(id);
    conn.close();
    info!(conn = %id, %peer_addr, state = ?ConnectionState::Closed, "tool disconnected");
}

/// Reads frames until close, error, or cancellation, queueing every text
/// message as a pending action.
async fn read_loop<R: AsyncRead + Unpin>(
    reader: &mut R,
    conn: &Arc<Connection>,
    actions: &Producer<PendingAction>,
    cancel: &CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            result = frame::read_frame(reader, MAX_FRAME_PAYLOAD) => match result {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(conn = %conn.id(), "read loop ended: {e}");
                    break;
                }
            }
        };

        match frame.opcode {
            Opcode::Text => {
                let action = PendingAction::new(frame.into_text(), Arc::clone(conn));
                if !actions.push(action) {
                    warn!(conn = %conn.id(), "action queue closed, dropping connection");
                    break;
                }
            }
            Opcode::Close => {
                debug!(conn = %conn.id(), "received close frame");
                break;
            }
            Opcode::Other(opcode) => {
                debug!(conn = %conn.id(), opcode, "ignoring non-text frame");
            }
        }
    }
}

/// Write pump: drains the outbound channel into the socket.
async fn write_pump<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut rx: mpsc::Receiver<FrameBytes>,
    cancel: CancellationToken,
    id: ConnectionId,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            frame = rx.recv() => {
                match frame {
                    Some(bytes) => {
                        if let Err(e) = writer.write_all(&bytes).await {
                            warn!(conn = %id, "write failed: {e}");
                            cancel.cancel();
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    // Dropping the receiver marks the connection dead for registry pruning.
    drop(rx);
    let _ = writer.shutdown().await;
}
