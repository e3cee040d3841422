//! Configuration management for the restore engine.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! for the secret key and log level.

use crate::resolve::ConflictStrategy;
use crate::utils::errors::{RestoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the hex-encoded archive key.
pub const ENV_ENCRYPTION_KEY: &str = "RESTORE_ENCRYPTION_KEY";
/// Environment variable overriding `log.level`.
pub const ENV_LOG_LEVEL: &str = "RESTORE_LOG_LEVEL";

/// Length of an AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub restore: RestoreConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    pub history: HistoryConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Directory holding backup descriptor files (`*.json`)
    pub metadata_dir: PathBuf,

    /// Base directory for archive paths that are stored relative
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Default restore destination when a request names none
    pub restore_root: PathBuf,

    /// Parent of the per-session extraction directories
    pub temp_dir: PathBuf,

    /// Force integrity verification for every request
    #[serde(default)]
    pub verify_before_restore: bool,

    /// Reapply source mode bits to restored files
    #[serde(default = "default_preserve_permissions")]
    pub preserve_permissions: bool,

    /// Strategy used when a request does not choose one
    #[serde(default)]
    pub default_strategy: ConflictStrategy,

    /// Streaming buffer size in bytes (default: 64KB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Emit a progress event every N files
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Hex-encoded 256-bit key
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// JSON file holding the restore history log
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds to wait for in-flight restores on shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

// Default values
fn default_preserve_permissions() -> bool {
    true
}

fn default_chunk_size() -> usize {
    64 * 1024 // 64KB
}

fn default_progress_interval() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration rooted at `/var/lib/restore-engine`
    pub fn default() -> Self {
        Self::with_root(Path::new("/var/lib/restore-engine"))
    }

    /// Default configuration with every directory placed under `root`
    pub fn with_root(root: &Path) -> Self {
        Config {
            catalog: CatalogConfig {
                metadata_dir: root.join("metadata"),
                backup_dir: Some(root.join("backups")),
            },
            restore: RestoreConfig {
                restore_root: root.join("restored"),
                temp_dir: root.join("tmp"),
                verify_before_restore: false,
                preserve_permissions: default_preserve_permissions(),
                default_strategy: ConflictStrategy::default(),
                chunk_size: default_chunk_size(),
                progress_interval: default_progress_interval(),
            },
            encryption: EncryptionConfig::default(),
            history: HistoryConfig {
                path: root.join("restore-history.json"),
            },
            log: LogConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(ENV_ENCRYPTION_KEY) {
            if !key.trim().is_empty() {
                self.encryption.key = Some(key.trim().to_string());
            }
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if !level.trim().is_empty() {
                self.log.level = level.trim().to_string();
            }
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.restore.chunk_size == 0 {
            return Err(RestoreError::Configuration(
                "restore.chunk_size must be greater than zero".into(),
            ));
        }
        if self.restore.progress_interval == 0 {
            return Err(RestoreError::Configuration(
                "restore.progress_interval must be greater than zero".into(),
            ));
        }
        if self.encryption.key.is_some() {
            self.decryption_key()?;
        }
        Ok(())
    }

    /// Decode the configured key. `Ok(None)` when no key is configured.
    pub fn decryption_key(&self) -> Result<Option<[u8; KEY_LEN]>> {
        let Some(hex_key) = self.encryption.key.as_deref() else {
            return Ok(None);
        };
        let bytes = hex::decode(hex_key.trim()).map_err(|e| {
            RestoreError::Configuration(format!("encryption.key is not valid hex: {}", e))
        })?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            RestoreError::Configuration(format!(
                "encryption.key must be {} bytes, got {}",
                KEY_LEN,
                b.len()
            ))
        })?;
        Ok(Some(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
            [catalog]
            metadata_dir = "/data/meta"

            [restore]
            restore_root = "/data/restore"
            temp_dir = "/data/tmp"

            [history]
            path = "/data/history.json"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.restore.chunk_size, 64 * 1024);
        assert_eq!(config.restore.progress_interval, 10);
        assert!(config.restore.preserve_permissions);
        assert!(!config.restore.verify_before_restore);
        assert_eq!(config.restore.default_strategy, ConflictStrategy::Prompt);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.daemon.shutdown_grace_secs, 30);
        assert!(config.encryption.key.is_none());
    }

    #[test]
    fn test_strategy_from_toml() {
        let toml = r#"
            [catalog]
            metadata_dir = "/m"
            [restore]
            restore_root = "/r"
            temp_dir = "/t"
            default_strategy = "rename"
            [history]
            path = "/h.json"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.restore.default_strategy, ConflictStrategy::Rename);
    }

    #[test]
    fn test_decryption_key() {
        let mut config = Config::with_root(Path::new("/tmp/x"));
        assert!(config.decryption_key().unwrap().is_none());

        config.encryption.key = Some("00".repeat(32));
        assert_eq!(config.decryption_key().unwrap(), Some([0u8; 32]));

        config.encryption.key = Some("abcd".to_string());
        assert!(matches!(
            config.decryption_key(),
            Err(RestoreError::Configuration(_))
        ));

        config.encryption.key = Some("zz".repeat(32));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_chunk() {
        let mut config = Config::with_root(Path::new("/tmp/x"));
        config.restore.chunk_size = 0;
        assert!(config.validate().is_err());
    }
}
