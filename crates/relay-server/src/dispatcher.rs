//! Command routing and execution on the host's tick.

use std::io;

use tracing::{debug, warn};
use vibelink_protocol::constants::{CMD_DUMP_HIERARCHY, CMD_PING};
use vibelink_protocol::{CommandEnvelope, Response, SceneDump};

use crate::connection::SendError;
use crate::queue::PendingAction;
use crate::registry::Registry;

/// The host application's scene, queried by `dump_hierarchy`.
///
/// Only ever called from the thread that runs [`RelayServer::tick`], so
/// implementations may touch state that is not `Send`.
///
/// [`RelayServer::tick`]: crate::RelayServer::tick
pub trait SceneHost {
    fn snapshot(&mut self) -> Result<SceneDump, SnapshotError>;
}

impl SceneHost for SceneDump {
    fn snapshot(&mut self) -> Result<SceneDump, SnapshotError> {
        Ok(self.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid scene data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("snapshot failed: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response not delivered: {0}")]
    Send(#[from] SendError),
}

/// How incoming text is matched against the local commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Any payload containing a command name matches it; `dump_hierarchy`
    /// is checked before `ping`.
    ///
    /// Matches are not word-bounded: a generator command whose
    /// `export_path` is `/home/u/Shopping/Assets` is answered as a ping and
    /// never relayed. Use [`MatchMode::Structural`] to avoid this.
    #[default]
    Substring,
    /// Only the exact `cmd` field of a JSON envelope matches.
    Structural,
}

/// Where a message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    DumpHierarchy,
    Ping,
    Relay,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRouter {
    mode: MatchMode,
}

impl CommandRouter {
    pub fn new(mode: MatchMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn route(&self, message: &str) -> Route {
        match self.mode {
            MatchMode::Substring => {
                if message.contains(CMD_DUMP_HIERARCHY) {
                    Route::DumpHierarchy
                } else if message.contains(CMD_PING) {
                    Route::Ping
                } else {
                    Route::Relay
                }
            }
            MatchMode::Structural => match CommandEnvelope::parse(message) {
                Ok(env) if env.cmd == CMD_DUMP_HIERARCHY => Route::DumpHierarchy,
                Ok(env) if env.cmd == CMD_PING => Route::Ping,
                _ => Route::Relay,
            },
        }
    }
}

/// Executes pending actions against the registry and the host scene.
pub struct Dispatcher<'a, H: ?Sized> {
    registry: &'a Registry,
    router: CommandRouter,
    host: &'a mut H,
}

impl<'a, H: SceneHost + ?Sized> Dispatcher<'a, H> {
    pub fn new(registry: &'a Registry, router: CommandRouter, host: &'a mut H) -> Self {
        Self {
            registry,
            router,
            host,
        }
    }

    /// Runs one action and queues its response on the originating
    /// connection. Returns the response that was sent.
    pub fn dispatch(&mut self, action: PendingAction) -> Result<Response, DispatchError> {
        let route = self.router.route(&action.message);
        debug!(conn = %action.origin.id(), ?route, "dispatching");

        let response = match self.execute(route, &action) {
            Ok(response) => response,
            Err(e) => {
                warn!(conn = %action.origin.id(), "command failed: {e}");
                Response::Error(e.to_string())
            }
        };

        action.origin.send_text(&response.to_json())?;
        Ok(response)
    }

    fn execute(&mut self, route: Route, action: &PendingAction) -> Result<Response, DispatchError> {
        match route {
            Route::DumpHierarchy => {
                let dump = self.host.snapshot()?;
                Ok(Response::Snapshot(dump.to_json_pretty()?))
            }
            Route::Ping => Ok(Response::Pong),
            Route::Relay => {
                let delivered = self
                    .registry
                    .broadcast_except(&action.message, action.origin.id());
                debug!(conn = %action.origin.id(), delivered, "relayed");
                Ok(Response::Relayed)
            }
        }
    }
}
