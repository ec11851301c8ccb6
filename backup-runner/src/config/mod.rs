//! Configuration management for the backup runner.
//!
//! Loads configuration from an optional TOML file with environment variable
//! overrides. Every section is optional and falls back to defaults.

pub mod targets;

pub use targets::{load_targets, parse_targets, ServerTarget};

use crate::retention::RetentionPolicy;
use crate::utils::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub retention: RetentionPolicy,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Target list, one `<url> <key>` per line
    #[serde(default = "default_servers_file")]
    pub servers_file: PathBuf,

    /// Root of the per-host mirrors (`{cache_dir}/{host}/files`)
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Root of the per-host archive directories
    #[serde(default = "default_backups_dir")]
    pub backups_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Path below each target URL where the backup endpoints live
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// zstd level (1-22)
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Keep going with the remaining targets when one fails. The run still
    /// ends with an error.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Cron expression (with seconds) to repeat the run on
    #[serde(default)]
    pub schedule: Option<String>,
}

// Default values
fn default_servers_file() -> PathBuf {
    PathBuf::from("servers.txt")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_backups_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_path_prefix() -> String {
    "contaobackup/".to_string()
}

fn default_user_agent() -> String {
    concat!("backup-runner/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_compression_level() -> i32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            servers_file: default_servers_file(),
            cache_dir: default_cache_dir(),
            backups_dir: default_backups_dir(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ArchiveConfig {
    /// Compression level clamped to what zstd accepts.
    pub fn level(&self) -> i32 {
        self.compression_level.clamp(1, 22)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BackupError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| BackupError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    /// Load the file if given (defaults otherwise), then apply environment
    /// overrides. A `.env` file in the working directory is honored.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `BACKUP_SERVERS_FILE`, `BACKUP_CACHE_DIR`, `BACKUP_BACKUPS_DIR`
    /// and `LOG_LEVEL` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BACKUP_SERVERS_FILE") {
            self.paths.servers_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("BACKUP_CACHE_DIR") {
            self.paths.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("BACKUP_BACKUPS_DIR") {
            self.paths.backups_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log.level = v;
        }
    }
}
