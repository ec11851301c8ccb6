//! Downloading the files a reconcile pass found missing.

use super::manifest::ManifestEntry;
use crate::api::RemoteSource;
use crate::utils::{BackupError, Result};
use std::path::{Component, Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info};

/// Summary of a materialize pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeOutcome {
    pub downloaded_files: usize,
    pub downloaded_bytes: u64,
    pub skipped_existing: usize,
}

/// Fetch every queued entry into `mirror_root`, one at a time.
///
/// Entries whose target path already exists are skipped without fetching.
/// Each download lands in a temporary file under `staging_dir` and is moved
/// into place only once complete. `staging_dir` must lie outside the mirror
/// but on the same filesystem.
pub async fn materialize<S>(
    mirror_root: &Path,
    staging_dir: &Path,
    queue: &[ManifestEntry],
    source: &S,
) -> Result<MaterializeOutcome>
where
    S: RemoteSource + ?Sized,
{
    let mut outcome = MaterializeOutcome::default();

    for entry in queue {
        let dest = mirror_path(mirror_root, &entry.path)?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BackupError::fs(parent, e))?;
        }

        if tokio::fs::try_exists(&dest)
            .await
            .map_err(|e| BackupError::fs(&dest, e))?
        {
            debug!(file = %entry.path, "Skip download, already present");
            outcome.skipped_existing += 1;
            continue;
        }

        // Dropped (and deleted) if the download fails.
        let staged = staging_file(staging_dir)?;
        let bytes = source.download_file(&entry.path, &staged).await?;
        staged
            .persist(&dest)
            .map_err(|e| BackupError::fs(&dest, e.error))?;

        outcome.downloaded_files += 1;
        outcome.downloaded_bytes += bytes;
    }

    info!(
        downloaded = outcome.downloaded_files,
        bytes = outcome.downloaded_bytes,
        skipped = outcome.skipped_existing,
        "Mirror materialized"
    );

    Ok(outcome)
}

/// Fresh, uniquely named file in `staging_dir`, removed on drop unless
/// persisted.
pub fn staging_file(staging_dir: &Path) -> Result<TempPath> {
    std::fs::create_dir_all(staging_dir).map_err(|e| BackupError::fs(staging_dir, e))?;
    let file = tempfile::Builder::new()
        .prefix("download-")
        .tempfile_in(staging_dir)
        .map_err(|e| BackupError::fs(staging_dir, e))?;
    Ok(file.into_temp_path())
}

/// Resolve a manifest path below `mirror_root`, rejecting anything that
/// could land outside it.
pub fn mirror_path(mirror_root: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative);
    let mut resolved = mirror_root.to_path_buf();
    let mut depth = 0usize;

    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(BackupError::InvalidPath(relative.to_string()));
            }
        }
    }

    if depth == 0 {
        return Err(BackupError::InvalidPath(relative.to_string()));
    }
    Ok(resolved)
}
