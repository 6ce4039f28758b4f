//! Configuration system for Courier.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $COURIER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/courier/config.toml
//!   3. ~/.config/courier/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub network: NetworkConfig,
    pub transfer: TransferConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port the server listens on.
    pub listen_port: u16,
    /// Default peer the client dials, as host:port.
    pub target: String,
    /// Initial dial backoff in seconds.
    pub backoff_secs: u64,
    /// Ceiling the backoff doubles up to.
    pub backoff_cap_secs: u64,
    /// Dial attempts before giving up. 0 = retry forever.
    pub max_dial_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk size in bytes. Must be positive.
    pub chunk_size: u64,
    /// Verify each chunk against its declared fingerprint. Disabling
    /// this is the degraded legacy path — tampering goes undetected
    /// until the final commitment check.
    pub verify: bool,
    /// Mirror chunks into the content store as they pass through.
    pub persist_chunks: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the content-addressed chunk store. Namespaced per peer
    /// below this.
    pub chunk_root: PathBuf,
    /// Where reconstructed files land.
    pub output_dir: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            transfer: TransferConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            target: "localhost:8080".to_string(),
            backoff_secs: 5,
            backoff_cap_secs: 60,
            max_dial_attempts: 0,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 128 * 1024,
            verify: true,
            persist_chunks: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunk_root: data_dir().join("chunks"),
            output_dir: data_dir().join("received"),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("courier")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("courier")
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

impl CourierConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            CourierConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("COURIER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&CourierConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply COURIER_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("COURIER_NETWORK__LISTEN_PORT") {
            if let Ok(p) = v.parse() {
                self.network.listen_port = p;
            }
        }
        if let Ok(v) = std::env::var("COURIER_NETWORK__TARGET") {
            self.network.target = v;
        }
        if let Ok(v) = std::env::var("COURIER_NETWORK__BACKOFF_SECS") {
            if let Ok(s) = v.parse() {
                self.network.backoff_secs = s;
            }
        }
        if let Ok(v) = std::env::var("COURIER_NETWORK__MAX_DIAL_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.network.max_dial_attempts = n;
            }
        }
        if let Ok(v) = std::env::var("COURIER_TRANSFER__CHUNK_SIZE") {
            if let Ok(s) = v.parse() {
                self.transfer.chunk_size = s;
            }
        }
        if let Ok(v) = std::env::var("COURIER_TRANSFER__VERIFY") {
            self.transfer.verify = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("COURIER_TRANSFER__PERSIST_CHUNKS") {
            self.transfer.persist_chunks = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("COURIER_STORAGE__CHUNK_ROOT") {
            self.storage.chunk_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("COURIER_STORAGE__OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(v);
        }
    }
}
