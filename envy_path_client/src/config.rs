// Client configuration.
//
// `ClientConfig` gathers the tunables the client reads at startup: where the
// server lives, how the channel retries a lost connection, how long the
// connection worker waits on a read before checking its outbound queue, and
// where the player token is persisted. Every field has a default, so an
// empty JSON object (or no config file at all) is a working config.
//
// The reconnect defaults match the reconnecting-websocket behaviour the
// browser client relied on: first retry after one second, each later delay
// 1.5× the previous, never more than thirty seconds.
//
// See also: `main.rs`, which layers command-line flags over a loaded config,
// and `channel.rs`, the consumer of `ReconnectPolicy`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Backoff schedule for re-opening a dropped channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            multiplier: 1.5,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based, reset after each
    /// successful open).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Top-level client configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base WebSocket URL, e.g. `ws://127.0.0.1:8000`.
    pub server_url: String,
    pub reconnect: ReconnectPolicy,
    /// Upper bound on how long the connection worker blocks in a read.
    pub read_poll_ms: u64,
    pub token_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8000".into(),
            reconnect: ReconnectPolicy::default(),
            read_poll_ms: 50,
            token_path: PathBuf::from(".envy_path_token.json"),
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ClientError> {
        serde_json::from_str(json).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms.max(1))
    }
}
