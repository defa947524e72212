use std::time::Duration;

use vibelink_protocol::constants::DEFAULT_PORT;

/// Reconnection backoff settings.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Delay for a 1-based attempt number, with ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let jitter = capped * 0.25;
        let offset: f64 = rand::random::<f64>() * 2.0 - 1.0; // [-1.0, 1.0)
        Duration::from_secs_f64((capped + jitter * offset).max(0.05))
    }
}

/// Where and how a tool connects to the relay.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Request target sent in the upgrade request.
    pub path: String,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            path: "/".into(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// `host:port`, used both to connect and as the `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
