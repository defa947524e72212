//! Relay server controller.
//!
//! Owns the listening socket, the registry, and the pending-action queue.
//! Network work happens on tokio tasks; command execution happens only in
//! [`RelayServer::tick`], on whatever thread the host calls it from.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vibelink_protocol::constants::DEFAULT_PORT;

use crate::ServerError;
use crate::connection::{self, ConnectionId, ConnectionState};
use crate::dispatcher::{CommandRouter, Dispatcher, MatchMode, SceneHost};
use crate::queue::{ActionQueue, PendingAction, Producer};
use crate::registry::Registry;

/// Actions executed per tick unless configured otherwise.
pub const DEFAULT_MAX_ACTIONS_PER_TICK: usize = 50;

/// Pause after a failed `accept` before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    pub bind_address: IpAddr,
    /// Whether [`RelayServer::activate`] starts listening.
    pub auto_start: bool,
    pub max_actions_per_tick: usize,
    pub match_mode: MatchMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            auto_start: true,
            max_actions_per_tick: DEFAULT_MAX_ACTIONS_PER_TICK,
            match_mode: MatchMode::default(),
        }
    }
}

struct Listening {
    cancel: CancellationToken,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

/// The VibeLink relay server.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    actions: ActionQueue<PendingAction>,
    router: CommandRouter,
    running: AtomicBool,
    listening: Mutex<Option<Listening>>,
    next_id: Arc<AtomicU64>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        let router = CommandRouter::new(config.match_mode);
        Self {
            config,
            registry: Arc::new(Registry::new()),
            actions: ActionQueue::new(),
            router,
            running: AtomicBool::new(false),
            listening: Mutex::new(None),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the listening socket and starts accepting tools.
    ///
    /// Does nothing if the server is already running. A bind failure is
    /// returned as [`ServerError::Bind`] and leaves the server stopped.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut listening = self.listening.lock().await;
        if listening.is_some() {
            debug!("relay server already running");
            return Ok(());
        }

        let port = self.config.port;
        let addr = SocketAddr::new(self.config.bind_address, port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        let local_addr = listener.local_addr()?;

        let cancel = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.registry),
            self.actions.producer(),
            Arc::clone(&self.next_id),
            cancel.clone(),
        ));

        *listening = Some(Listening {
            cancel,
            local_addr,
            accept_task,
        });
        self.running.store(true, Ordering::Release);
        info!(%local_addr, "relay server listening");
        Ok(())
    }

    /// Stops accepting, then closes every connected tool.
    ///
    /// Safe to call when already stopped.
    pub async fn stop(&self) {
        let mut listening = self.listening.lock().await;
        self.running.store(false, Ordering::Release);
        let Some(listening) = listening.take() else {
            return;
        };

        listening.cancel.cancel();
        if let Err(e) = listening.accept_task.await {
            warn!("accept loop ended abnormally: {e}");
        }
        let closed = self.registry.close_all();
        info!(closed, "relay server stopped");
    }

    /// Starts the server if `auto_start` is configured.
    pub async fn activate(&self) -> Result<(), ServerError> {
        if self.config.auto_start {
            self.start().await
        } else {
            debug!("auto start disabled");
            Ok(())
        }
    }

    pub async fn deactivate(&self) {
        self.stop().await;
    }

    /// Executes up to `max_actions_per_tick` pending actions against
    /// `host` and returns how many ran.
    pub fn tick<H: SceneHost + ?Sized>(&self, host: &mut H) -> usize {
        let mut dispatcher = Dispatcher::new(&self.registry, self.router, host);
        self.actions
            .drain_up_to(self.config.max_actions_per_tick, |action| {
                dispatcher.dispatch(action).map(drop)
            })
    }

    /// Sends `text` to every connected tool.
    pub fn broadcast(&self, text: &str) -> usize {
        self.registry.broadcast(text)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Address the server is listening on, while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.lock().await.as_ref().map(|l| l.local_addr)
    }

    /// Listening port (0 when stopped).
    pub async fn port(&self) -> u16 {
        self.local_addr().await.map(|a| a.port()).unwrap_or(0)
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        if let Some(listening) = self.listening.get_mut().take() {
            listening.cancel.cancel();
            self.registry.close_all();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<Registry>,
    actions: Producer<PendingAction>,
    next_id: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("accept loop stopping");
                break;
            }

            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let id = ConnectionId(next_id.fetch_add(1, Ordering::Relaxed));
                        debug!(conn = %id, %peer_addr, state = ?ConnectionState::Connecting, "accepted");
                        let _ = stream.set_nodelay(true);
                        tokio::spawn(connection::handle_connection(
                            stream,
                            peer_addr,
                            id,
                            Arc::clone(&registry),
                            actions.clone(),
                            cancel.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("accept error: {e}");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                        }
                    }
                }
            }
        }
    }
}
