//! Hierarchical gateway configuration: built-in
//! defaults, overlaid by an optional TOML file, overlaid by `TITAN_GATEWAY_*`
//! environment variables. CLI flags are layered on top of this in
//! `bin/gateway.rs`, matching the `spacetime` binary's precedence of
//! defaults < config file < explicit flags.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use titan_ratelimit::{EndpointMapping, PolicySpec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub service_id: String,
    pub membership_store: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { service_id: "titan".into(), membership_store: PathBuf::from("./data/directory") }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 5, initial_backoff_ms: 50, jitter: true }
    }
}

impl From<RetryConfig> for titan_storage::RetryConfig {
    /// `jitter` has no matching knob on the storage-side config — it is
    /// always applied there — so it is read for validation but otherwise
    /// dropped at this boundary.
    fn from(c: RetryConfig) -> Self {
        titan_storage::RetryConfig { max_retries: c.max_attempts, initial_backoff: Duration::from_millis(c.initial_backoff_ms), ..Default::default() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub connection: PathBuf,
    pub retry: RetryConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { connection: PathBuf::from("./data/storage"), retry: RetryConfig::default() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    pub default_policy: Option<String>,
    pub policies: Vec<PolicySpec>,
    pub mappings: Vec<EndpointMapping>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub lifetime_secs: u64,
    pub sliding: bool,
    pub max_per_user: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { lifetime_secs: 24 * 3600, sliding: true, max_per_user: 10 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketSettings {
    pub lifetime_secs: u64,
}

impl Default for TicketSettings {
    fn default() -> Self {
        Self { lifetime_secs: 30 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub providers: Vec<String>,
    pub session: SessionSettings,
    pub ticket: TicketSettings,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { providers: vec!["Mock".into()], session: SessionSettings::default(), ticket: TicketSettings::default() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    pub provider_name: String,
    pub per_stream_buffer_max: usize,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self { provider_name: "memory".into(), per_stream_buffer_max: 256 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub cluster: ClusterConfig,
    pub storage: StorageConfig,
    pub rate_limiting: RateLimitingConfig,
    pub auth: AuthConfig,
    pub streams: StreamsConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".parse().unwrap(),
            cluster: ClusterConfig::default(),
            storage: StorageConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            auth: AuthConfig::default(),
            streams: StreamsConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
                toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("TITAN_GATEWAY_LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse() {
                self.listen_addr = parsed;
            }
        }
        if let Ok(path) = std::env::var("TITAN_GATEWAY_STORAGE_CONNECTION") {
            self.storage.connection = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("TITAN_GATEWAY_MEMBERSHIP_STORE") {
            self.cluster.membership_store = PathBuf::from(path);
        }
        if let Ok(id) = std::env::var("TITAN_GATEWAY_SERVICE_ID") {
            self.cluster.service_id = id;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.service_id.is_empty() {
            return Err(ConfigError::Invalid("cluster.serviceId must not be empty".into()));
        }
        if self.auth.providers.is_empty() {
            return Err(ConfigError::Invalid("auth.providers must name at least one provider".into()));
        }
        Ok(())
    }

    pub fn session_settings(&self) -> crate::auth::SessionConfig {
        crate::auth::SessionConfig {
            lifetime: Duration::from_secs(self.auth.session.lifetime_secs),
            sliding: self.auth.session.sliding,
            max_per_user: self.auth.session.max_per_user,
        }
    }

    pub fn ticket_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.ticket.lifetime_secs)
    }
}
