//! Hierarchical silo configuration: built-in defaults, overlaid by an
//! optional TOML file, overlaid by `TITAN_SILO_*` environment variables.
//! Mirrors `titan_gateway::config`'s precedence (defaults < config file <
//! environment < explicit CLI flags, the last applied by `main.rs`).

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

/// Bounds the two-phase commit coordinator: how long a transaction has end
/// to end, and how long a lock waiter sits before the deadlock-avoidance
/// timeout trips.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionsConfig {
    pub deadline_secs: u64,
    pub max_lock_wait_secs: u64,
}

impl Default for TransactionsConfig {
    fn default() -> Self {
        Self { deadline_secs: 10, max_lock_wait_secs: 5 }
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
pub struct SiloConfig {
    pub admin_listen_addr: SocketAddr,
    pub heartbeat_interval_secs: u64,
    pub cluster: ClusterConfig,
    pub storage: StorageConfig,
    pub rate_limiting: RateLimitingConfig,
    pub transactions: TransactionsConfig,
    pub streams: StreamsConfig,
}

impl Default for SiloConfig {
    fn default() -> Self {
        Self {
            admin_listen_addr: "0.0.0.0:9090".parse().unwrap(),
            heartbeat_interval_secs: 10,
            cluster: ClusterConfig::default(),
            storage: StorageConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            transactions: TransactionsConfig::default(),
            streams: StreamsConfig::default(),
        }
    }
}

impl SiloConfig {
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
        if let Ok(addr) = std::env::var("TITAN_SILO_ADMIN_LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse() {
                self.admin_listen_addr = parsed;
            }
        }
        if let Ok(path) = std::env::var("TITAN_SILO_STORAGE_CONNECTION") {
            self.storage.connection = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("TITAN_SILO_MEMBERSHIP_STORE") {
            self.cluster.membership_store = PathBuf::from(path);
        }
        if let Ok(id) = std::env::var("TITAN_SILO_SERVICE_ID") {
            self.cluster.service_id = id;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.service_id.is_empty() {
            return Err(ConfigError::Invalid("cluster.serviceId must not be empty".into()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid("heartbeatIntervalSecs must be positive".into()));
        }
        Ok(())
    }

    pub fn directory_failure_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs * 3)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.transactions.max_lock_wait_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = SiloConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_service_id_is_rejected() {
        let mut config = SiloConfig::default();
        config.cluster.service_id.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn a_toml_file_overlays_the_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silo.toml");
        std::fs::write(&path, "admin_listen_addr = \"127.0.0.1:9191\"\n[cluster]\nservice_id = \"my-cluster\"\n").unwrap();
        let config = SiloConfig::load(Some(&path)).unwrap();
        assert_eq!(config.admin_listen_addr.port(), 9191);
        assert_eq!(config.cluster.service_id, "my-cluster");
    }
}
