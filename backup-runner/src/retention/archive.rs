//! Archive descriptors and the on-disk naming scheme.
//!
//! The archive directory itself is the only record of what exists:
//! `{tag}_{%Y-%m-%d_%H-%M-%S}_{hostname}.tar.zst`. Creation time is read
//! back from the name so listings do not depend on filesystem timestamps.

use super::granularity::Granularity;
use crate::utils::{BackupError, Result};
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of finished archives.
pub const ARCHIVE_EXTENSION: &str = "tar.zst";

/// Suffix of archives still being written. Never listed as a backup.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Timestamp embedded in archive names (second resolution).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const TIMESTAMP_LEN: usize = 19;

/// One retained archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    pub granularity: Granularity,
    pub created_at: NaiveDateTime,
    pub filename: String,
    pub hostname: String,
    pub path: PathBuf,
}

/// Name of the archive for `granularity` created at `at` for `hostname`.
pub fn archive_filename(granularity: Granularity, at: &NaiveDateTime, hostname: &str) -> String {
    format!(
        "{}_{}_{}.{}",
        granularity.tag(),
        at.format(TIMESTAMP_FORMAT),
        hostname,
        ARCHIVE_EXTENSION
    )
}

/// Split an archive name into granularity, timestamp and hostname.
pub fn parse_archive_filename(name: &str) -> Option<(Granularity, NaiveDateTime, String)> {
    let stem = name.strip_suffix(ARCHIVE_EXTENSION)?.strip_suffix('.')?;
    let (tag, rest) = stem.split_once('_')?;
    let granularity = Granularity::from_tag(tag)?;

    let timestamp = rest.get(..TIMESTAMP_LEN)?;
    let hostname = rest.get(TIMESTAMP_LEN..)?.strip_prefix('_')?;
    if hostname.is_empty() {
        return None;
    }

    let created_at = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
    Some((granularity, created_at, hostname.to_string()))
}

/// List the archives of `hostname` in `dir`.
///
/// Files that do not follow the naming scheme or belong to another host are
/// ignored. Leftover `.partial` files from an interrupted archive step are
/// deleted. A missing directory lists as empty.
pub fn list_archives(dir: &Path, hostname: &str) -> Result<Vec<BackupArchive>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(BackupError::fs(dir, e)),
    };

    let mut archives = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| BackupError::fs(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| BackupError::fs(&path, e))?;
        if !file_type.is_file() {
            continue;
        }

        let filename = entry.file_name().to_string_lossy().into_owned();

        if filename.ends_with(PARTIAL_SUFFIX) {
            warn!(file = %filename, "Removing incomplete archive from an earlier run");
            fs::remove_file(&path).map_err(|e| BackupError::fs(&path, e))?;
            continue;
        }

        let Some((granularity, created_at, owner)) = parse_archive_filename(&filename) else {
            debug!(file = %filename, "Ignoring unrecognized file in archive directory");
            continue;
        };
        if owner != hostname {
            debug!(file = %filename, "Ignoring archive of another host");
            continue;
        }

        archives.push(BackupArchive {
            granularity,
            created_at,
            filename,
            hostname: owner,
            path,
        });
    }

    Ok(archives)
}
