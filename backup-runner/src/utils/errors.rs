//! Error types for the backup runner.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Step of a target run, attached to errors so the log names the operation
/// that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prepare,
    Retention,
    Manifest,
    Reconcile,
    Download,
    Dump,
    Archive,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Prepare => "prepare",
            Stage::Retention => "retention",
            Stage::Manifest => "manifest",
            Stage::Reconcile => "reconcile",
            Stage::Download => "download",
            Stage::Dump => "database dump",
            Stage::Archive => "archive",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Invalid manifest path: {0}")]
    InvalidPath(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Backup of {hostname} failed during {stage}: {source}")]
    Target {
        hostname: String,
        stage: Stage,
        #[source]
        source: Box<BackupError>,
    },

    #[error("{failed} of {total} targets failed")]
    TargetsFailed { failed: usize, total: usize },
}

impl BackupError {
    /// Wrap an I/O error with the path it happened on.
    pub fn fs(path: &Path, source: io::Error) -> Self {
        BackupError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Attach target and stage context.
    pub fn during(self, hostname: &str, stage: Stage) -> Self {
        BackupError::Target {
            hostname: hostname.to_string(),
            stage,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
