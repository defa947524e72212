//! WebSocket relay server for the VibeLink host.
//!
//! Accepts any number of tool connections, decodes their text frames into
//! pending actions, and executes those actions one at a time when the host
//! calls [`RelayServer::tick`]. Local commands (`ping`, `dump_hierarchy`)
//! are answered directly; everything else is relayed verbatim to the other
//! connected tools.

mod connection;
mod dispatcher;
mod queue;
mod registry;
mod server;

pub use connection::{Connection, ConnectionId, ConnectionState, SendError};
pub use dispatcher::{
    CommandRouter, DispatchError, Dispatcher, MatchMode, Route, SceneHost, SnapshotError,
};
pub use queue::{ActionQueue, PendingAction, Producer};
pub use registry::Registry;
pub use server::{DEFAULT_MAX_ACTIONS_PER_TICK, RelayServer, ServerConfig};

/// Outbound frame buffer per connection.
///
/// Responses and relayed commands are queued here by the host tick and
/// written by the connection's write pump. A full buffer drops the frame
/// rather than stalling the tick.
pub const SEND_BUFFER_SIZE: usize = 1024;

/// Errors produced by the relay server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
