//! # vload-config
//!
//! Configuration management for vload.
//!
//! Loads configuration from:
//! 1. `~/.vload/config.toml` (global)
//! 2. `.vload/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod path;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default local store root, before tilde expansion.
pub const DEFAULT_STORE_ROOT: &str = "~/.vload/store";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML render error: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub network: NetworkConfig,
    pub transfer: TransferConfig,
    pub preload: PreloadConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        Self::load_from(global.as_deref(), Some(Path::new(".vload/config.toml")))
    }

    /// Load config from explicit global and project files. Missing files are skipped.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                let contents = std::fs::read_to_string(global_path)?;
                config = toml::from_str(&contents)?;
            }
        }

        if let Some(project_path) = project {
            if project_path.exists() {
                debug!("Loading project config from {:?}", project_path);
                let contents = std::fs::read_to_string(project_path)?;
                let project_config: Config = toml::from_str(&contents)?;
                config.merge(project_config);
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Global config path: ~/.vload/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".vload/config.toml"))
    }

    /// Merge a project config: every field it sets away from the default wins.
    fn merge(&mut self, other: Config) {
        let defaults = Config::default();
        if other.store.root != defaults.store.root {
            self.store.root = other.store.root;
        }
        if other.store.capacity != defaults.store.capacity {
            self.store.capacity = other.store.capacity;
        }
        if other.network.base_url != defaults.network.base_url {
            self.network.base_url = other.network.base_url;
        }
        if other.network.timeout_secs != defaults.network.timeout_secs {
            self.network.timeout_secs = other.network.timeout_secs;
        }
        if other.transfer.chunk_size != defaults.transfer.chunk_size {
            self.transfer.chunk_size = other.transfer.chunk_size;
        }
        if other.transfer.size_hint != defaults.transfer.size_hint {
            self.transfer.size_hint = other.transfer.size_hint;
        }
        if other.preload.list.is_some() {
            self.preload.list = other.preload.list;
        }
        if !other.preload.paths.is_empty() {
            self.preload.paths = other.preload.paths;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("VLOAD_STORE_ROOT") {
            self.store.root = PathBuf::from(root);
        }
        if let Ok(capacity) = std::env::var("VLOAD_STORE_CAPACITY") {
            if let Ok(n) = capacity.parse() {
                self.store.capacity = n;
            }
        }
        if let Ok(url) = std::env::var("VLOAD_BASE_URL") {
            self.network.base_url = url;
        }
        if let Ok(chunk) = std::env::var("VLOAD_CHUNK_SIZE") {
            if let Ok(n) = chunk.parse::<usize>() {
                if n > 0 {
                    self.transfer.chunk_size = n;
                }
            }
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

/// Local durable store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the local store (`~` is expanded)
    pub root: PathBuf,
    /// Quota requested when the store is opened, in bytes
    pub capacity: u64,
}

impl StoreConfig {
    /// Root with a leading `~` expanded to the home directory.
    pub fn resolved_root(&self) -> PathBuf {
        path::expand_home(&self.root)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORE_ROOT),
            capacity: 64 * 1024 * 1024,
        }
    }
}

/// Network fallback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL that virtual paths are resolved against
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Chunked transfer tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes per local read/write chunk
    pub chunk_size: usize,
    /// Default capacity reserved for downloads when the caller gives no hint
    pub size_hint: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            size_hint: 1024,
        }
    }
}

/// Preload batch configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// File with one virtual path per line
    pub list: Option<PathBuf>,
    /// Inline virtual paths, fetched after the ones from `list`
    pub paths: Vec<String>,
}

impl PreloadConfig {
    /// Full ordered batch: lines of `list` first, then `paths`.
    ///
    /// Blank lines and lines starting with `#` in the list file are skipped.
    pub fn resolve(&self) -> Result<Vec<String>, ConfigError> {
        let mut batch = Vec::new();
        if let Some(list) = &self.list {
            let body = std::fs::read_to_string(path::expand_home(list))?;
            batch.extend(
                body.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(String::from),
            );
        }
        batch.extend(self.paths.iter().cloned());
        Ok(batch)
    }
}
