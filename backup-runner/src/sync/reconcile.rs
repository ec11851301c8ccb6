//! Reconciliation of the local mirror against a remote manifest.
//!
//! The walk is an explicit post-order traversal. Each directory is listed
//! into a snapshot before anything in it is touched, its children are
//! resolved (files kept or deleted, subdirectories recursed into and pruned),
//! and only then is its own emptiness evaluated.

use super::hasher::hash_file;
use super::manifest::{ManifestEntry, RemoteManifest};
use crate::utils::{BackupError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of a reconcile pass.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Manifest entries not satisfied locally, sorted by path.
    pub download_queue: Vec<ManifestEntry>,

    /// Files kept because path and hash matched
    pub kept_files: usize,

    /// Files deleted as unknown or stale
    pub deleted_files: usize,

    /// Directories removed because they ended up empty
    pub pruned_dirs: usize,
}

/// Make `mirror_root` contain only files whose path and hash match
/// `manifest`, and report what still has to be downloaded.
///
/// The root itself is created if missing and is never removed. Any read or
/// delete failure aborts the walk.
pub fn reconcile(mirror_root: &Path, manifest: &RemoteManifest) -> Result<ReconcileOutcome> {
    fs::create_dir_all(mirror_root).map_err(|e| BackupError::fs(mirror_root, e))?;

    let mut walk = Walk {
        manifest,
        satisfied: HashSet::new(),
        outcome: ReconcileOutcome::default(),
    };
    walk.process_dir(mirror_root, "")?;

    let Walk {
        satisfied,
        mut outcome,
        ..
    } = walk;

    outcome.download_queue = manifest
        .entries()
        .into_iter()
        .filter(|entry| !satisfied.contains(&entry.path))
        .collect();

    info!(
        kept = outcome.kept_files,
        deleted = outcome.deleted_files,
        pruned_dirs = outcome.pruned_dirs,
        missing = outcome.download_queue.len(),
        "Mirror reconciled"
    );

    Ok(outcome)
}

struct Walk<'a> {
    manifest: &'a RemoteManifest,
    satisfied: HashSet<String>,
    outcome: ReconcileOutcome,
}

impl Walk<'_> {
    /// Resolve one directory and return how many entries remain in it.
    fn process_dir(&mut self, dir: &Path, rel_dir: &str) -> Result<usize> {
        let mut children: Vec<(PathBuf, String)> = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| BackupError::fs(dir, e))? {
            let entry = entry.map_err(|e| BackupError::fs(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            children.push((entry.path(), name));
        }
        children.sort_by(|a, b| a.1.cmp(&b.1));

        let mut remaining = 0usize;

        for (path, name) in children {
            let rel = if rel_dir.is_empty() {
                name
            } else {
                format!("{}/{}", rel_dir, name)
            };

            let file_type = fs::symlink_metadata(&path)
                .map_err(|e| BackupError::fs(&path, e))?
                .file_type();

            if file_type.is_dir() {
                if self.process_dir(&path, &rel)? > 0 {
                    remaining += 1;
                } else {
                    debug!(dir = %rel, "Pruning empty directory");
                    fs::remove_dir(&path).map_err(|e| BackupError::fs(&path, e))?;
                    self.outcome.pruned_dirs += 1;
                }
                continue;
            }

            if file_type.is_file() && self.matches_manifest(&path, &rel)? {
                debug!(file = %rel, "Keep");
                self.satisfied.insert(rel);
                self.outcome.kept_files += 1;
                remaining += 1;
            } else {
                debug!(file = %rel, "Delete");
                fs::remove_file(&path).map_err(|e| BackupError::fs(&path, e))?;
                self.outcome.deleted_files += 1;
            }
        }

        Ok(remaining)
    }

    fn matches_manifest(&self, path: &Path, rel: &str) -> Result<bool> {
        let Some(expected) = self.manifest.hash_of(rel) else {
            return Ok(false);
        };
        let actual = hash_file(path).map_err(|e| BackupError::fs(path, e))?;
        Ok(actual.eq_ignore_ascii_case(expected))
    }
}
