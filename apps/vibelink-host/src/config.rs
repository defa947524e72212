//! Host configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/vibelink/host.toml`
//! - Windows: `%APPDATA%/vibelink/host.toml`
//!
//! `VIBELINK_CONFIG` overrides the location.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vibelink_protocol::constants::DEFAULT_PORT;
use vibelink_server::{MatchMode, ServerConfig};

const CONFIG_ENV: &str = "VIBELINK_CONFIG";

/// Host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Relay port tools connect to.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Start listening as soon as the host is up.
    #[serde(default = "default_true")]
    pub auto_start: bool,

    /// Host tick period in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_max_actions")]
    pub max_actions_per_tick: usize,

    /// Match commands on the exact `cmd` field instead of by substring.
    #[serde(default)]
    pub strict_commands: bool,

    /// JSON scene description answered to `dump_hierarchy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_file: Option<PathBuf>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_true() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    16
}

fn default_max_actions() -> usize {
    vibelink_server::DEFAULT_MAX_ACTIONS_PER_TICK
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            auto_start: default_true(),
            tick_interval_ms: default_tick_interval(),
            max_actions_per_tick: default_max_actions(),
            strict_commands: false,
            scene_file: None,
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            bind_address: self.bind_address,
            auto_start: self.auto_start,
            max_actions_per_tick: self.max_actions_per_tick,
            match_mode: if self.strict_commands {
                MatchMode::Structural
            } else {
                MatchMode::Substring
            },
        }
    }
}

/// Returns the configuration file path.
pub fn config_path() -> PathBuf {
    resolve_config_path(std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

fn resolve_config_path(override_path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = override_path.filter(|p| !p.as_os_str().is_empty()) {
        return path;
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("vibelink").join("host.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("vibelink")
            .join("host.toml")
    }
}
