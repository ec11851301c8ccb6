//! Per-target directory layout.

use crate::config::PathsConfig;
use crate::utils::{BackupError, Result};
use std::path::PathBuf;

/// Directory under `cache_dir` holding per-host staging areas. Hostnames
/// never start with a dot, so it cannot collide with a host directory.
const STAGING_DIR: &str = ".staging";

/// Where one target's state lives on disk:
///
/// ```text
/// {cache_dir}/{host}/files/...      mirror
/// {cache_dir}/{host}/dump.sql       latest database dump
/// {cache_dir}/.staging/{host}/      in-flight downloads
/// {backups_dir}/{host}/*.tar.zst    retained archives
/// ```
///
/// Staging sits outside both the mirror and `host_dir`, so a temporary file
/// can neither shadow a manifest path nor end up in an archive.
#[derive(Debug, Clone)]
pub struct TargetLayout {
    /// Everything archived for the host: mirror plus dump
    pub host_dir: PathBuf,
    pub files_dir: PathBuf,
    pub dump_file: PathBuf,
    pub staging_dir: PathBuf,
    pub archive_dir: PathBuf,
}

impl TargetLayout {
    pub fn new(paths: &PathsConfig, hostname: &str) -> Self {
        let host_dir = paths.cache_dir.join(hostname);
        Self {
            files_dir: host_dir.join("files"),
            dump_file: host_dir.join("dump.sql"),
            staging_dir: paths.cache_dir.join(STAGING_DIR).join(hostname),
            archive_dir: paths.backups_dir.join(hostname),
            host_dir,
        }
    }

    /// Create the mirror, staging and archive directories if missing.
    /// Downloads left in staging by an interrupted run are discarded.
    pub fn ensure(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.staging_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BackupError::fs(&self.staging_dir, e)),
        }
        for dir in [&self.files_dir, &self.staging_dir, &self.archive_dir] {
            std::fs::create_dir_all(dir).map_err(|e| BackupError::fs(dir, e))?;
        }
        Ok(())
    }
}
