// Static configuration: relay address, signaling reconnect policy, ICE servers.
// Nothing here is negotiated with the peer.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;
use webrtc::ice_transport::ice_server::RTCIceServer;

use crate::error::ConfigError;
use crate::utils::add_ice_url_scheme;

/// Env var naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "PAIRTALK_CONFIG";
/// Env var overriding the relay URL.
pub const RELAY_URL_ENV: &str = "PAIRTALK_RELAY_URL";

pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:5000/ws";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub relay_url: String,
    pub signaling: SignalingConfig,
    pub ice_servers: Vec<ServerConfig>,
}

/// Reconnect policy for the relay link.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SignalingConfig {
    pub reconnection: bool,
    pub reconnection_attempts: u32,
    pub timeout_ms: u64,
    pub reconnection_delay_ms: u64,
    pub reconnection_delay_max_ms: u64,
    pub randomization_factor: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IceServerKind {
    Stun,
    Turn,
}

/// ICE server entry
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: IceServerKind,
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            reconnection: true,
            reconnection_attempts: 5,
            timeout_ms: 60_000,
            reconnection_delay_ms: 1_000,
            reconnection_delay_max_ms: 5_000,
            randomization_factor: 0.5,
        }
    }
}

impl SignalingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Back-off before reconnect attempt `attempt` (1-based), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .reconnection_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.reconnection_delay_max_ms);
        Duration::from_millis(ms)
    }

    /// Back-off with `randomization_factor` jitter applied, `roll` in `[0, 1)`.
    pub fn jittered_delay(&self, attempt: u32, roll: f64) -> Duration {
        let base = self.base_delay(attempt).as_millis() as f64;
        let factor = self.randomization_factor.clamp(0.0, 1.0);
        let deviation = base * factor;
        let ms = base - deviation + roll.clamp(0.0, 1.0) * 2.0 * deviation;
        Duration::from_millis(ms.max(0.0) as u64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.into(),
            signaling: SignalingConfig::default(),
            ice_servers: default_ice_servers(),
        }
    }
}

/// One discovery server and one relay-fallback server with static credentials.
pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            kind: IceServerKind::Stun,
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-turn".into(),
            kind: IceServerKind::Turn,
            url: "turn:turn.bistri.com:80".into(),
            username: Some("homeo".into()),
            credential: Some("homeo".into()),
        },
    ]
}

impl Config {
    /// Defaults, then the JSON file named by `PAIRTALK_CONFIG`, then the relay URL override.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        if let Ok(url) = std::env::var(RELAY_URL_ENV) {
            debug!(%url, "relay url overridden from environment");
            config.relay_url = url;
        }
        config.validate()?;
        info!(relay = %config.relay_url, ice_servers = config.ice_servers.len(), "configuration loaded");
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&raw).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.relay_url).map_err(|e| ConfigError::RelayUrl {
            url: self.relay_url.clone(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ConfigError::RelayUrl {
                url: self.relay_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        if self.signaling.reconnection && self.signaling.reconnection_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }

        for server in &self.ice_servers {
            if server.url.trim().is_empty() {
                return Err(ConfigError::EmptyIceUrl(server.id.clone()));
            }
            if server.kind == IceServerKind::Turn
                && (server.username.is_none() || server.credential.is_none())
            {
                return Err(ConfigError::TurnCredentials(server.id.clone()));
            }
        }
        Ok(())
    }

    pub fn rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        self.ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: vec![add_ice_url_scheme(server)],
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
            })
            .collect()
    }
}
