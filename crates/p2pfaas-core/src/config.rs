//! Node configuration.
//!
//! Static settings come from an optional TOML file, then environment
//! variables, then defaults. The dynamic settings (admission limits) and
//! the active scheduler descriptor are JSON files under the data path,
//! rewritten whenever they are changed through the API.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const APP_NAME: &str = "p2pfaas-scheduler";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DYNAMIC_CONFIG_FILE: &str = "p2p_faas-scheduler.json";
pub const SCHEDULER_CONFIG_FILE: &str = "p2p_faas-scheduler-config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("cannot encode configuration: {0}")]
    Encode(String),
}

/// Static configuration of a scheduler node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub listening_port: u16,
    pub data_path: PathBuf,
    pub node: NodeIdentityConfig,
    pub discovery: DiscoveryConfig,
    pub learner: LearnerConfig,
    pub faas: FaasConfig,
    pub timeouts: TimeoutsConfig,
}

/// Identity this node reports in peer lists. Unset fields are asked to
/// the discovery service at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeIdentityConfig {
    pub machine_id: Option<String>,
    pub machine_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub host: String,
    pub port: u16,
    /// Seconds between background refreshes of the peer list.
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    pub host: String,
    pub port: u16,
    pub pool_size: usize,
    /// Connect to the learner at startup. Only the learning policy uses it.
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaasConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub probe_ms: u64,
    pub peer_ms: u64,
    pub faas_ms: u64,
    pub discovery_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listening_port: 18080,
            data_path: PathBuf::from("/data"),
            node: NodeIdentityConfig::default(),
            discovery: DiscoveryConfig::default(),
            learner: LearnerConfig::default(),
            faas: FaasConfig::default(),
            timeouts: TimeoutsConfig::default(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            host: "discovery".to_string(),
            port: 19000,
            refresh_interval_secs: 10,
        }
    }
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            host: "learner".to_string(),
            port: 19020,
            pool_size: 20,
            enabled: false,
        }
    }
}

impl Default for FaasConfig {
    fn default() -> Self {
        Self {
            host: "faas-gateway".to_string(),
            port: 8080,
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            probe_ms: 2_000,
            peer_ms: 60_000,
            faas_ms: 60_000,
            discovery_ms: 5_000,
        }
    }
}

impl TimeoutsConfig {
    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }

    pub fn peer(&self) -> Duration {
        Duration::from_millis(self.peer_ms)
    }

    pub fn faas(&self) -> Duration {
        Duration::from_millis(self.faas_ms)
    }

    pub fn discovery(&self) -> Duration {
        Duration::from_millis(self.discovery_ms)
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Encode(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `P2PFAAS_*` overrides resolved through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let port = |key: &str| lookup(key).and_then(|v| v.parse::<u16>().ok()).filter(|p| *p > 0);

        if let Some(p) = port("P2PFAAS_LISTENING_PORT") {
            self.listening_port = p;
        }
        if let Some(v) = lookup("P2PFAAS_DATA_PATH").filter(|v| !v.is_empty()) {
            self.data_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("P2PFAAS_SERVICE_DISCOVERY_HOST").filter(|v| !v.is_empty()) {
            self.discovery.host = v;
        }
        if let Some(p) = port("P2PFAAS_SERVICE_DISCOVERY_PORT") {
            self.discovery.port = p;
        }
        if let Some(v) = lookup("P2PFAAS_SERVICE_LEARNING_HOST").filter(|v| !v.is_empty()) {
            self.learner.host = v;
        }
        if let Some(p) = port("P2PFAAS_SERVICE_LEARNING_PORT") {
            self.learner.port = p;
        }
        if let Some(v) = lookup("P2PFAAS_SERVICE_LEARNING_ENABLED") {
            self.learner.enabled = v == "true" || v == "1";
        }
        if let Some(v) = lookup("P2PFAAS_FAAS_HOST").filter(|v| !v.is_empty()) {
            self.faas.host = v;
        }
        if let Some(p) = port("P2PFAAS_FAAS_PORT") {
            self.faas.port = p;
        }
        if let Some(v) = lookup("P2PFAAS_MACHINE_ID").filter(|v| !v.is_empty()) {
            self.node.machine_id = Some(v);
        }
        if let Some(v) = lookup("P2PFAAS_MACHINE_IP").filter(|v| !v.is_empty()) {
            self.node.machine_ip = Some(v);
        }
    }

    pub fn dynamic_config_path(&self) -> PathBuf {
        self.data_path.join(DYNAMIC_CONFIG_FILE)
    }

    pub fn scheduler_config_path(&self) -> PathBuf {
        self.data_path.join(SCHEDULER_CONFIG_FILE)
    }

    pub fn discovery_address(&self) -> String {
        format!("{}:{}", self.discovery.host, self.discovery.port)
    }

    pub fn learner_address(&self) -> String {
        format!("{}:{}", self.learner.host, self.learner.port)
    }

    pub fn faas_address(&self) -> String {
        format!("{}:{}", self.faas.host, self.faas.port)
    }
}

/// Admission limits, adjustable at runtime through `/configuration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicConfig {
    pub parallel_running_functions_max: usize,
    pub queue_length_max: usize,
    pub queue_enabled: bool,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            parallel_running_functions_max: 4,
            queue_length_max: 4,
            queue_enabled: true,
        }
    }
}

/// Read a JSON document, returning `None` when the file does not exist.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a JSON document, creating the parent directory if needed.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let content =
        serde_json::to_string_pretty(value).map_err(|e| ConfigError::Encode(e.to_string()))?;
    std::fs::write(path, content).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}
