//! Tool-side handle: supervisor task, outbound queue, inbox.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ClientError;
use crate::config::ClientConfig;
use crate::session;

/// Messages received from the relay, waiting for the tool to handle them.
///
/// Tools typically drain this from their own main-thread timer so that
/// scene edits stay on the thread that owns the scene.
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<String>,
}

impl Inbox {
    /// Takes every message received so far, oldest first.
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Waits for the next message. Returns `None` once the client stopped
    /// and every message was taken.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Connection from a generator tool to the relay.
///
/// Keeps reconnecting until stopped; messages sent while disconnected are
/// delivered once a session is up again.
pub struct ToolClient {
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ToolClient {
    /// Spawns the connection supervisor. Must be called within a tokio
    /// runtime.
    pub fn start(config: ClientConfig) -> (Self, Inbox) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let supervisor = tokio::spawn(supervise(
            config,
            outbound_rx,
            inbox_tx,
            Arc::clone(&connected),
            cancel.clone(),
        ));

        let client = Self {
            outbound,
            connected,
            cancel,
            supervisor: Mutex::new(Some(supervisor)),
        };
        (client, Inbox { rx: inbox_rx })
    }

    /// Queues a text message for the relay.
    pub fn send(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.outbound.send(text.into()).map_err(|_| ClientError::Closed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Disconnects and waits for the supervisor to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("client supervisor ended abnormally: {e}");
        }
    }
}

impl Drop for ToolClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn supervise(
    config: ClientConfig,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbox: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let authority = config.authority();
    let mut attempt: u32 = 0;
    let mut retry: Option<String> = None;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = session::connect(&config) => result,
        };

        match result {
            Ok((reader, writer)) => {
                attempt = 0;
                connected.store(true, Ordering::Release);
                info!(relay = %authority, "connected to relay");

                let outcome = session::run(
                    reader,
                    writer,
                    &mut outbound,
                    &mut retry,
                    inbox.clone(),
                    &cancel,
                )
                .await;

                connected.store(false, Ordering::Release);
                match outcome {
                    Ok(()) => debug!(relay = %authority, "session finished"),
                    Err(e) => warn!(relay = %authority, "disconnected: {e}"),
                }
            }
            Err(e) => {
                warn!(relay = %authority, attempt, "connect failed: {e}");
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        attempt = attempt.saturating_add(1);
        let delay = config.reconnect.delay_for_attempt(attempt);
        info!(
            relay = %authority,
            attempt,
            delay_secs = format_args!("{:.1}", delay.as_secs_f64()),
            "reconnecting"
        );
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    connected.store(false, Ordering::Release);
    debug!(relay = %authority, "client supervisor stopped");
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use super::*;
    use crate::config::ReconnectConfig;
    use vibelink_protocol::{SceneDump, ToolCommand};
    use vibelink_server::{RelayServer, ServerConfig};

    const WAIT: Duration = Duration::from_secs(3);

    fn fast_reconnect(port: u16) -> ClientConfig {
        ClientConfig {
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(50),
                max_delay: Duration::from_millis(200),
                backoff_factor: 2.0,
            },
            ..ClientConfig::with_port(port)
        }
    }

    fn server_config(port: u16) -> ServerConfig {
        ServerConfig {
            port,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..Default::default()
        }
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(WAIT, async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// Ticks the server until the inbox yields a message.
    async fn tick_for_reply(server: &RelayServer, inbox: &mut Inbox) -> String {
        let mut scene = SceneDump::empty();
        tokio::time::timeout(WAIT, async {
            loop {
                server.tick(&mut scene);
                if let Some(msg) = inbox.try_recv() {
                    return msg;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("no reply in time")
    }

    #[tokio::test]
    async fn ping_roundtrip_through_relay() {
        let port = free_port();
        let server = RelayServer::new(server_config(port));
        server.start().await.unwrap();

        let (client, mut inbox) = ToolClient::start(fast_reconnect(port));
        wait_until(|| client.is_connected() && server.client_count() == 1).await;

        client.send(r#"{"cmd":"ping"}"#).unwrap();
        assert_eq!(
            tick_for_reply(&server, &mut inbox).await,
            r#"{"status":"pong"}"#
        );

        client.stop().await;
        assert!(!client.is_connected());
        server.stop().await;
    }

    #[tokio::test]
    async fn host_command_reaches_tool() {
        let port = free_port();
        let server = RelayServer::new(server_config(port));
        server.start().await.unwrap();

        let (client, mut inbox) = ToolClient::start(fast_reconnect(port));
        wait_until(|| server.client_count() == 1).await;

        let cmd = ToolCommand::tree(4.0, 77, "/project/Assets");
        assert_eq!(server.broadcast(&cmd.to_json().unwrap()), 1);

        let received = tokio::time::timeout(WAIT, inbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ToolCommand::parse(&received).unwrap(), cmd);

        client.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn relay_between_two_tools() {
        let port = free_port();
        let server = RelayServer::new(server_config(port));
        server.start().await.unwrap();

        let (editor, mut editor_inbox) = ToolClient::start(fast_reconnect(port));
        let (tool, mut tool_inbox) = ToolClient::start(fast_reconnect(port));
        wait_until(|| server.client_count() == 2).await;

        let cmd = ToolCommand::humanoid("guard", 5, "/p").to_json().unwrap();
        editor.send(cmd.clone()).unwrap();

        assert_eq!(
            tick_for_reply(&server, &mut editor_inbox).await,
            r#"{"status":"relayed"}"#
        );
        let relayed = tokio::time::timeout(WAIT, tool_inbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(relayed, cmd);

        editor.stop().await;
        tool.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn buffered_send_survives_until_server_is_up() {
        let port = free_port();
        let (client, mut inbox) = ToolClient::start(fast_reconnect(port));

        client.send("ping").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!client.is_connected());

        let server = RelayServer::new(server_config(port));
        server.start().await.unwrap();

        assert_eq!(
            tick_for_reply(&server, &mut inbox).await,
            r#"{"status":"pong"}"#
        );
        client.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn reconnects_after_server_restart() {
        let port = free_port();
        let server = RelayServer::new(server_config(port));
        server.start().await.unwrap();

        let (client, mut inbox) = ToolClient::start(fast_reconnect(port));
        wait_until(|| client.is_connected()).await;

        server.stop().await;
        wait_until(|| !client.is_connected()).await;

        server.start().await.unwrap();
        wait_until(|| client.is_connected() && server.client_count() == 1).await;

        client.send("ping").unwrap();
        assert_eq!(
            tick_for_reply(&server, &mut inbox).await,
            r#"{"status":"pong"}"#
        );
        client.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn send_after_stop_fails() {
        let (client, _inbox) = ToolClient::start(fast_reconnect(free_port()));
        client.stop().await;
        // Idempotent.
        client.stop().await;
        assert!(matches!(client.send("late"), Err(ClientError::Closed)));
    }
}
