use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::id::DEFAULT_ID_LENGTH;

// =============================================================================
// Unified config (figment-deserialized from defaults / config file / env vars)
// =============================================================================
//
// Layers, lowest to highest:
//
//   defaults
//   slide-relay.toml:     [server]
//                         port = 3001
//   deployment env:       PORT, HOST, BASE_URL, VITE_API_URL, VERCEL_URL, NODE_ENV
//   prefixed env:         SLIDE_RELAY_SERVER__PORT=3001   (double underscore = nesting)
//   CLI flags             (merged by main)

pub const DEFAULT_CONFIG_FILE: &str = "slide-relay.toml";
pub const ENV_PREFIX: &str = "SLIDE_RELAY_";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatFileConfig,
    #[serde(default)]
    pub public_url: PublicUrlFileConfig,
    /// Raw `NODE_ENV`, kept for compatibility with the frontend's deployments.
    #[serde(default)]
    pub node_env: Option<String>,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Relay tunables (lives under `[relay]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    #[serde(default = "default_id_length")]
    pub id_length: usize,
    #[serde(default = "default_max_id_attempts")]
    pub max_id_attempts: usize,
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            id_length: default_id_length(),
            max_id_attempts: default_max_id_attempts(),
            send_channel_capacity: default_send_channel_capacity(),
        }
    }
}

/// Liveness checks (lives under `[heartbeat]`). Zero disables either knob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatFileConfig {
    #[serde(default = "default_heartbeat_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HeartbeatFileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_heartbeat_interval_secs(),
            timeout_secs: default_heartbeat_timeout_secs(),
        }
    }
}

/// How remote-control URLs are built (lives under `[public_url]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicUrlFileConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub vercel_url: Option<String>,
    #[serde(default)]
    pub production: bool,
    #[serde(default = "default_dev_frontend_url")]
    pub dev_frontend_url: String,
}

impl Default for PublicUrlFileConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            vercel_url: None,
            production: false,
            dev_frontend_url: default_dev_frontend_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3001
}
fn default_id_length() -> usize {
    DEFAULT_ID_LENGTH
}
fn default_max_id_attempts() -> usize {
    16
}
fn default_send_channel_capacity() -> usize {
    100
}
fn default_heartbeat_interval_secs() -> u64 {
    25
}
fn default_heartbeat_timeout_secs() -> u64 {
    60
}
fn default_dev_frontend_url() -> String {
    "http://localhost:5173".to_string()
}

/// Maps the plain deployment variables onto config keys.
fn deployment_key(key: &str) -> Option<&'static str> {
    match key.to_ascii_uppercase().as_str() {
        "PORT" => Some("server.port"),
        "HOST" => Some("server.host"),
        "BASE_URL" | "VITE_API_URL" => Some("public_url.base_url"),
        "VERCEL_URL" => Some("public_url.vercel_url"),
        "NODE_ENV" => Some("node_env"),
        _ => None,
    }
}

/// Build a figment that layers: defaults → config file → deployment env → SLIDE_RELAY_* env.
pub fn load_config(config_file: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    fn deployment(names: &[&str]) -> Env {
        Env::raw()
            .only(names)
            .map(|key| deployment_key(key.as_str()).unwrap_or("unused").into())
    }

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_file))
        // VITE_API_URL takes precedence over BASE_URL, as in the frontend build.
        .merge(deployment(&["PORT", "HOST", "BASE_URL", "VERCEL_URL", "NODE_ENV"]))
        .merge(deployment(&["VITE_API_URL"]))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig)
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub relay: RelaySettings,
    pub heartbeat: HeartbeatConfig,
    pub public_url: PublicUrlConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct RelaySettings {
    /// Characters per generated session id
    pub id_length: usize,
    /// Id draws before giving up on a collision streak
    pub max_id_attempts: usize,
    /// Outbound queue depth per connection
    pub send_channel_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct HeartbeatConfig {
    /// How often to ping idle clients (None = never)
    pub interval: Option<Duration>,
    /// Close connections silent for this long (None = never)
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct PublicUrlConfig {
    pub production: bool,
    pub base_url: Option<String>,
    pub vercel_url: Option<String>,
    pub dev_frontend_url: String,
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

impl RelayConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        let production =
            fc.public_url.production || fc.node_env.as_deref() == Some("production");
        Self {
            server: ServerConfig {
                host: fc.server.host.clone(),
                port: fc.server.port,
            },
            relay: RelaySettings {
                id_length: fc.relay.id_length.max(1),
                max_id_attempts: fc.relay.max_id_attempts.max(1),
                send_channel_capacity: fc.relay.send_channel_capacity.max(1),
            },
            heartbeat: HeartbeatConfig {
                interval: non_zero_secs(fc.heartbeat.interval_secs),
                timeout: non_zero_secs(fc.heartbeat.timeout_secs),
            },
            public_url: PublicUrlConfig {
                production,
                base_url: non_empty(&fc.public_url.base_url),
                vercel_url: non_empty(&fc.public_url.vercel_url),
                dev_frontend_url: fc.public_url.dev_frontend_url.clone(),
            },
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse::<SocketAddr>()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    self.server.host, self.server.port
                )
            })
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_file(&FileConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.server.host, "0.0.0.0");
        assert_eq!(fc.server.port, 3001);
        assert_eq!(fc.relay.id_length, 8);
        assert_eq!(fc.relay.max_id_attempts, 16);
        assert_eq!(fc.relay.send_channel_capacity, 100);
        assert_eq!(fc.heartbeat.interval_secs, 25);
        assert_eq!(fc.heartbeat.timeout_secs, 60);
        assert!(fc.public_url.base_url.is_none());
        assert!(!fc.public_url.production);
    }

    // ── RelayConfig::from_file ──────────────────────────────────────────

    #[test]
    fn test_heartbeat_zero_disables() {
        let fc = FileConfig {
            heartbeat: HeartbeatFileConfig {
                interval_secs: 0,
                timeout_secs: 0,
            },
            ..Default::default()
        };
        let rc = RelayConfig::from_file(&fc);
        assert!(rc.heartbeat.interval.is_none());
        assert!(rc.heartbeat.timeout.is_none());
    }

    #[test]
    fn test_node_env_production() {
        let fc = FileConfig {
            node_env: Some("production".into()),
            ..Default::default()
        };
        assert!(RelayConfig::from_file(&fc).public_url.production);

        let fc = FileConfig {
            node_env: Some("development".into()),
            ..Default::default()
        };
        assert!(!RelayConfig::from_file(&fc).public_url.production);
    }

    #[test]
    fn test_blank_urls_are_ignored() {
        let fc = FileConfig {
            public_url: PublicUrlFileConfig {
                base_url: Some("  ".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(RelayConfig::from_file(&fc).public_url.base_url.is_none());
    }

    #[test]
    fn test_bind_addr() {
        let rc = RelayConfig::default();
        assert_eq!(rc.bind_addr().unwrap().port(), 3001);

        let mut bad = RelayConfig::default();
        bad.server.host = "not a host".into();
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_deployment_key_mapping() {
        assert_eq!(deployment_key("PORT"), Some("server.port"));
        assert_eq!(deployment_key("port"), Some("server.port"));
        assert_eq!(deployment_key("VITE_API_URL"), Some("public_url.base_url"));
        assert_eq!(deployment_key("HOME"), None);
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(
            &path,
            "[relay]\nid_length = 6\nmax_id_attempts = 4\n\n[heartbeat]\ntimeout_secs = 0\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(&path).extract().unwrap();
        assert_eq!(fc.relay.id_length, 6);
        assert_eq!(fc.relay.max_id_attempts, 4);
        assert_eq!(fc.heartbeat.timeout_secs, 0);
        assert_eq!(fc.heartbeat.interval_secs, 25);
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(&tmp.path().join("absent.toml"))
            .extract()
            .unwrap();
        assert_eq!(fc.relay.send_channel_capacity, 100);
        assert_eq!(fc.public_url.dev_frontend_url, "http://localhost:5173");
    }
}
