//! Vault configuration.
//!
//! Stored as TOML. Default paths follow the XDG base directory layout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{Result, VaultError};
use crate::fs::write_atomic;
use crate::repository::OrphanPolicy;
use crate::security::{DEFAULT_KEYCHAIN_SERVICE, MASTER_KEY_ID};
use crate::store::DEFAULT_BUSY_TIMEOUT;

const APP_DIR: &str = "promptvault";

/// Store path that selects an in-memory store.
pub const IN_MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub store: StoreSection,
    pub security: SecuritySection,
    #[serde(default)]
    pub reconcile: ReconcileSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSection {
    /// Store file, or `:memory:`.
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySection {
    #[serde(default = "default_key_id")]
    pub key_id: String,
    pub backend: KeyBackend,
    #[serde(default = "default_keychain_service")]
    pub keychain_service: String,
    #[serde(default)]
    pub keyfile_mode: KeyfileMode,
    pub keyfile_dir: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSection {
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Where the master key lives.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyBackend {
    /// Process memory; the key dies with the process.
    Memory,
    /// The OS credential store.
    Keychain,
    /// A keyfile under `keyfile_dir`.
    Keyfile,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyfileMode {
    #[default]
    Plain,
    Encrypted,
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT.as_millis() as u64
}

fn default_key_id() -> String {
    MASTER_KEY_ID.to_string()
}

fn default_keychain_service() -> String {
    DEFAULT_KEYCHAIN_SERVICE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl VaultConfig {
    /// Configuration with default XDG paths and the OS keychain.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(default_store_path()?, KeyBackend::Keychain))
    }

    pub fn new(store_path: PathBuf, backend: KeyBackend) -> Self {
        Self {
            store: StoreSection {
                path: store_path.to_string_lossy().to_string(),
                busy_timeout_ms: default_busy_timeout_ms(),
            },
            security: SecuritySection {
                key_id: default_key_id(),
                backend,
                keychain_service: default_keychain_service(),
                keyfile_mode: KeyfileMode::default(),
                keyfile_dir: None,
            },
            reconcile: ReconcileSection::default(),
            logging: LoggingSection::default(),
        }
    }

    /// In-memory store with an in-memory key. Nothing touches disk.
    pub fn ephemeral() -> Self {
        Self::new(PathBuf::from(IN_MEMORY_PATH), KeyBackend::Memory)
    }

    pub fn with_keyfile(mut self, dir: PathBuf, mode: KeyfileMode) -> Self {
        self.security.backend = KeyBackend::Keyfile;
        self.security.keyfile_dir = Some(dir.to_string_lossy().to_string());
        self.security.keyfile_mode = mode;
        self
    }

    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.reconcile.orphan_policy = policy;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.store.path == IN_MEMORY_PATH
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.store.path)
    }

    pub fn keyfile_dir(&self) -> Option<PathBuf> {
        self.security.keyfile_dir.as_ref().map(PathBuf::from)
    }

    /// Reject settings that cannot work together.
    pub fn validate(&self) -> Result<()> {
        if self.store.path.trim().is_empty() {
            return Err(VaultError::Config("store.path cannot be empty".to_string()));
        }
        if self.store.busy_timeout_ms == 0 {
            return Err(VaultError::Config(
                "store.busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.security.key_id.trim().is_empty() {
            return Err(VaultError::Config(
                "security.key_id cannot be empty".to_string(),
            ));
        }
        if self.security.backend == KeyBackend::Keychain
            && self.security.keychain_service.trim().is_empty()
        {
            return Err(VaultError::Config(
                "security.keychain_service cannot be empty".to_string(),
            ));
        }
        if self.security.backend == KeyBackend::Keyfile && self.security.keyfile_dir.is_none() {
            return Err(VaultError::Config(format!(
                "security.keyfile_dir is required for the {} keyfile backend",
                match self.security.keyfile_mode {
                    KeyfileMode::Plain => "plain",
                    KeyfileMode::Encrypted => "encrypted",
                }
            )));
        }
        EnvFilter::try_new(&self.logging.level)
            .map_err(|e| VaultError::Config(format!("logging.level: {}", e)))?;
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

pub fn default_store_path() -> Result<PathBuf> {
    Ok(xdg_data_dir()?.join("prompts.db"))
}

pub fn default_keyfile_dir() -> Result<PathBuf> {
    Ok(xdg_config_dir()?.join("keys"))
}

pub fn read_config(path: &Path) -> Result<VaultConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        VaultError::Config(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    toml::from_str(&contents)
        .map_err(|e| VaultError::Config(format!("Failed to parse config {}: {}", path.display(), e)))
}

pub fn write_config(path: &Path, config: &VaultConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            VaultError::Config(format!(
                "Failed to create config directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    let contents = toml::to_string_pretty(config)
        .map_err(|e| VaultError::Config(format!("TOML error: {}", e)))?;
    write_atomic(path, contents.as_bytes()).map_err(|e| {
        VaultError::Config(format!("Failed to write config {}: {}", path.display(), e))
    })
}

pub fn xdg_config_dir() -> Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join(APP_DIR));
        }
    }
    Ok(home_dir()?.join(".config").join(APP_DIR))
}

pub fn xdg_data_dir() -> Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_DATA_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join(APP_DIR));
        }
    }
    Ok(home_dir()?.join(".local").join("share").join(APP_DIR))
}

fn home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| {
        VaultError::Config("HOME is not set; cannot resolve default paths".to_string())
    })?;
    Ok(PathBuf::from(home))
}
