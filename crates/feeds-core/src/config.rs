//! Configuration for the feeds daemon.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $FEEDS_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/feeds/config.toml
//!   3. ~/.config/feeds/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub network: NetworkConfig,
    pub rpc: RpcConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP address peers connect to.
    pub listen_addr: String,
    /// Largest inbound frame accepted before the connection is dropped.
    pub max_frame_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Pagination ceiling for a single response envelope.
    pub max_envelope_bytes: usize,
    /// Worker pool size. 0 = 1.
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// JSON table of access tokens and the users they resolve to.
    pub tokens_path: PathBuf,
    /// Owner DID declared at startup. Empty leaves declaration to the
    /// `declare_owner` method.
    pub owner_did: String,
    /// Whether the DID layer reports itself ready.
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub version_code: i64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:10018".to_string(),
            max_frame_bytes: 1 << 20,
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_envelope_bytes: 4096,
            workers: 4,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: data_dir().join("feeds.sqlite3"),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            tokens_path: config_dir().join("tokens.json"),
            owner_did: String::new(),
            ready: true,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "feedsd".to_string(),
            version_code: 10200,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("feeds")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("feeds")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl FeedsConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a config file without env overrides. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("FEEDS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_at(&path)?;
        Ok(path)
    }

    pub fn write_default_at(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text =
            toml::to_string_pretty(&FeedsConfig::default()).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply FEEDS_* overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FEEDS_NETWORK__LISTEN_ADDR") {
            self.network.listen_addr = v;
        }
        if let Some(n) = lookup("FEEDS_RPC__MAX_ENVELOPE_BYTES").and_then(|v| v.parse().ok()) {
            self.rpc.max_envelope_bytes = n;
        }
        if let Some(n) = lookup("FEEDS_RPC__WORKERS").and_then(|v| v.parse().ok()) {
            self.rpc.workers = n;
        }
        if let Some(v) = lookup("FEEDS_STORAGE__DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FEEDS_AUTH__TOKENS_PATH") {
            self.auth.tokens_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FEEDS_AUTH__OWNER_DID") {
            self.auth.owner_did = v;
        }
    }

    /// Worker count, never zero.
    pub fn workers(&self) -> usize {
        self.rpc.workers.max(1)
    }
}
