use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StrongboxError};
use crate::permission::PermissionOperation;

const STRONGBOX_CONFIG_ENV: &str = "STRONGBOX_CONFIG";

/// Shortest passphrase accepted for a password-derived master key.
pub const MIN_PASSPHRASE_LENGTH: usize = 20;

/// Configuration file format (~/.strongbox/strongbox.toml).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    /// Datastore file. Defaults to ~/.strongbox/store.db
    pub path: Option<PathBuf>,
    /// Keep everything in memory; nothing survives the process.
    #[serde(default)]
    pub memory: bool,
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| strongbox_dir().join("store.db"))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyProvider {
    /// Key derived from a passphrase and a per-canary salt.
    Password,
    /// Key held by an external key-management service.
    External,
}

/// One configured master key.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyConfig {
    pub provider: KeyProvider,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub passphrase: Option<SecretString>,
    #[serde(default)]
    pub key_label: Option<String>,
    /// Upper bound on a single call to the external provider.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

impl KeyConfig {
    pub fn password(passphrase: &str, active: bool) -> Self {
        Self {
            provider: KeyProvider::Password,
            active,
            passphrase: Some(SecretString::new(passphrase.to_string())),
            key_label: None,
            timeout_ms: default_provider_timeout_ms(),
        }
    }

    pub fn external(key_label: &str, active: bool) -> Self {
        Self {
            provider: KeyProvider::External,
            active,
            passphrase: None,
            key_label: Some(key_label.to_string()),
            timeout_ms: default_provider_timeout_ms(),
        }
    }

    fn validate(&self, index: usize) -> Result<()> {
        match self.provider {
            KeyProvider::Password => {
                let passphrase = self.passphrase.as_ref().ok_or_else(|| {
                    StrongboxError::Config(format!("encryption key #{index}: passphrase is required"))
                })?;
                if passphrase.expose_secret().chars().count() < MIN_PASSPHRASE_LENGTH {
                    return Err(StrongboxError::Config(format!(
                        "encryption key #{index}: passphrase must be at least {MIN_PASSPHRASE_LENGTH} characters"
                    )));
                }
            }
            KeyProvider::External => {
                if self.key_label.as_deref().map_or(true, str::is_empty) {
                    return Err(StrongboxError::Config(format!(
                        "encryption key #{index}: key_label is required"
                    )));
                }
                if self.timeout_ms == 0 {
                    return Err(StrongboxError::Config(format!(
                        "encryption key #{index}: timeout_ms must be positive"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Re-encrypt values under retired keys while opening the store.
    #[serde(default)]
    pub on_startup: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            on_startup: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionsConfig {
    /// When false every actor may perform every operation.
    #[serde(default = "default_true")]
    pub enforce: bool,
    /// ACL entries ensured every time the store is opened.
    #[serde(default)]
    pub bootstrap: Vec<PermissionBootstrap>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            enforce: true,
            bootstrap: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionBootstrap {
    pub path: String,
    pub actors: Vec<String>,
    pub operations: Vec<PermissionOperation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_provider_timeout_ms() -> u64 {
    5_000
}

fn default_batch_size() -> usize {
    crate::rotation::DEFAULT_BATCH_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Get the default strongbox directory path (~/.strongbox).
pub fn strongbox_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".strongbox")
}

impl Config {
    /// Config path: $STRONGBOX_CONFIG, else ~/.strongbox/strongbox.toml.
    pub fn default_path() -> PathBuf {
        std::env::var_os(STRONGBOX_CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| strongbox_dir().join("strongbox.toml"))
    }

    /// Load config from a path. Returns default config if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| StrongboxError::Config(format!("Invalid config: {}", e)))
    }

    /// Check the invariants the key set and rotation engine rely on.
    pub fn validate(&self) -> Result<()> {
        if self.encryption.keys.is_empty() {
            return Err(StrongboxError::Config(
                "at least one encryption key must be configured".into(),
            ));
        }
        for (index, key) in self.encryption.keys.iter().enumerate() {
            key.validate(index)?;
        }
        let active = self.encryption.keys.iter().filter(|k| k.active).count();
        if active != 1 {
            return Err(StrongboxError::Config(format!(
                "exactly one encryption key must be active, found {active}"
            )));
        }
        if self.rotation.batch_size == 0 {
            return Err(StrongboxError::Config("rotation.batch_size must be positive".into()));
        }
        Ok(())
    }
}
