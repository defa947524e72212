//! Host orchestrator: relay lifecycle plus the main-thread tick loop.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use vibelink_protocol::{SceneDump, SceneNode};
use vibelink_server::{RelayServer, SceneHost, SnapshotError};

use crate::config::Config;

/// On-disk scene description: a named tree of nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneFile {
    pub name: String,
    #[serde(default)]
    pub roots: Vec<SceneNode>,
}

/// Scene backed by a JSON file, re-read on every snapshot so edits show up
/// without restarting the host.
pub struct FileScene {
    path: Option<PathBuf>,
}

impl FileScene {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl SceneHost for FileScene {
    fn snapshot(&mut self) -> Result<SceneDump, SnapshotError> {
        let Some(path) = &self.path else {
            return Ok(SceneDump::empty());
        };
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SceneDump::empty()),
            Err(e) => return Err(e.into()),
        };
        let file: SceneFile = serde_json::from_str(&content)?;
        Ok(SceneDump::from_roots(file.name, &file.roots))
    }
}

/// Runs the host until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let server = RelayServer::new(config.server_config());
    server.activate().await?;
    if server.is_running() {
        tracing::info!(port = server.port().await, "relay ready");
    } else {
        tracing::info!("auto start disabled, relay idle");
    }

    let mut scene = FileScene::new(config.scene_file.clone());
    let period = Duration::from_millis(config.tick_interval_ms.max(1));

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("SIGINT received, shutting down"),
            Err(e) => tracing::error!("failed to listen for Ctrl-C: {e}"),
        }
    };
    tick_until(&server, &mut scene, period, shutdown).await;

    server.deactivate().await;
    Ok(())
}

/// Ticks `server` every `period` until `shutdown` resolves.
pub async fn tick_until<H: SceneHost>(
    server: &RelayServer,
    scene: &mut H,
    period: Duration,
    shutdown: impl Future<Output = ()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let processed = server.tick(scene);
                if processed > 0 {
                    tracing::trace!(processed, "tick");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use tokio::sync::oneshot;
    use vibelink_client::{ClientConfig, ToolClient};

    const WAIT: Duration = Duration::from_secs(3);

    fn write_scene(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("scene.json");
        let json = serde_json::json!({
            "name": "Village",
            "roots": [
                {
                    "name": "House",
                    "id": 1,
                    "components": ["Transform", "MeshFilter"],
                    "children": [ { "name": "Door", "id": 2 } ]
                },
                { "name": "Sun", "id": 3, "components": ["Light (Disabled)"] }
            ]
        });
        std::fs::write(&path, json.to_string()).unwrap();
        path
    }

    #[test]
    fn no_scene_file_reports_no_active_scene() {
        let dump = FileScene::new(None).snapshot().unwrap();
        assert_eq!(dump.scene_name, "No Active Scene");
        assert!(dump.objects.is_empty());
    }

    #[test]
    fn missing_scene_file_reports_no_active_scene() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = FileScene::new(Some(tmp.path().join("absent.json")))
            .snapshot()
            .unwrap();
        assert_eq!(dump.scene_name, "No Active Scene");
    }

    #[test]
    fn scene_file_is_flattened() {
        let tmp = tempfile::tempdir().unwrap();
        let mut scene = FileScene::new(Some(write_scene(tmp.path())));
        let dump = scene.snapshot().unwrap();

        assert_eq!(dump.scene_name, "Village");
        let names: Vec<_> = dump
            .objects
            .iter()
            .map(|o| (o.name.as_str(), o.parent_id))
            .collect();
        assert_eq!(names, vec![("House", 0), ("Door", 1), ("Sun", 0)]);
        assert_eq!(dump.objects[2].components, vec!["Light (Disabled)"]);
    }

    #[test]
    fn scene_file_is_reread() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_scene(tmp.path());
        let mut scene = FileScene::new(Some(path.clone()));
        assert_eq!(scene.snapshot().unwrap().objects.len(), 3);

        std::fs::write(&path, r#"{"name":"Empty"}"#).unwrap();
        let dump = scene.snapshot().unwrap();
        assert_eq!(dump.scene_name, "Empty");
        assert!(dump.objects.is_empty());
    }

    #[test]
    fn malformed_scene_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scene.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            FileScene::new(Some(path)).snapshot(),
            Err(SnapshotError::Json(_))
        ));
    }

    #[tokio::test]
    async fn tick_loop_answers_tools() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            port: 0,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            scene_file: Some(write_scene(tmp.path())),
            ..Config::default()
        };

        let server = RelayServer::new(config.server_config());
        server.activate().await.unwrap();
        let port = server.port().await;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let mut scene = FileScene::new(config.scene_file.clone());
        let host = tick_until(&server, &mut scene, Duration::from_millis(5), async {
            let _ = stop_rx.await;
        });

        let tool = async {
            let (client, mut inbox) = ToolClient::start(ClientConfig::with_port(port));
            client.send(r#"{"cmd":"dump_hierarchy"}"#).unwrap();
            let reply = tokio::time::timeout(WAIT, inbox.recv())
                .await
                .expect("no reply in time")
                .unwrap();
            client.stop().await;
            let _ = stop_tx.send(());
            reply
        };

        let ((), reply) = tokio::join!(host, tool);
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["sceneName"], "Village");
        assert_eq!(value["objects"][1]["name"], "Door");
        assert_eq!(value["objects"][1]["parentId"], 1);

        server.deactivate().await;
        assert!(!server.is_running());
    }
}
