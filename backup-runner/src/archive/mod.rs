//! Snapshot archiver.
//!
//! Packs a host's cache directory (mirror + database dump) into one
//! `.tar.zst` per pending granularity. The source tree is read once: the tar
//! stream is compressed once and the compressed bytes are fanned out to every
//! destination, so all archives of a run are byte-identical.

pub mod fanout;

use crate::fs::walker::walk_directory;
use crate::retention::archive::{archive_filename, PARTIAL_SUFFIX};
use crate::retention::Granularity;
use crate::utils::{BackupError, Result};
use chrono::NaiveDateTime;
use fanout::FanOutWriter;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of one archive step.
#[derive(Debug, Clone, Default)]
pub struct ArchiveOutcome {
    /// Finished archives, in pending-set order
    pub paths: Vec<PathBuf>,

    /// Files packed into each archive
    pub file_count: usize,

    /// Uncompressed size of those files
    pub source_bytes: u64,

    /// Size of each (identical) archive
    pub archive_bytes: u64,
}

struct Destination {
    partial: PathBuf,
    target: PathBuf,
}

/// Write `{archive_dir}/{tag}_{timestamp}_{hostname}.tar.zst` for every tag
/// in `pending`.
///
/// All sinks are opened before the source is read and all are flushed and
/// synced before any archive is renamed into place. If anything fails, every
/// destination of this call is removed.
pub fn create_archives(
    source_dir: &Path,
    pending: &[Granularity],
    archive_dir: &Path,
    hostname: &str,
    now: &NaiveDateTime,
    compression_level: i32,
) -> Result<ArchiveOutcome> {
    if pending.is_empty() {
        return Ok(ArchiveOutcome::default());
    }

    fs::create_dir_all(archive_dir).map_err(|e| BackupError::fs(archive_dir, e))?;

    let destinations: Vec<Destination> = pending
        .iter()
        .map(|g| {
            let target = archive_dir.join(archive_filename(*g, now, hostname));
            let mut partial = target.clone().into_os_string();
            partial.push(PARTIAL_SUFFIX);
            Destination {
                partial: PathBuf::from(partial),
                target,
            }
        })
        .collect();

    match write_all_destinations(source_dir, &destinations, compression_level) {
        Ok(outcome) => {
            for archive in &outcome.paths {
                info!(host = %hostname, file = %archive.display(), "Archive created");
            }
            Ok(outcome)
        }
        Err(e) => {
            for dest in &destinations {
                remove_if_present(&dest.partial);
                remove_if_present(&dest.target);
            }
            Err(BackupError::Archive(format!(
                "writing {} archive(s) for {}: {}",
                destinations.len(),
                hostname,
                e
            )))
        }
    }
}

fn write_all_destinations(
    source_dir: &Path,
    destinations: &[Destination],
    compression_level: i32,
) -> io::Result<ArchiveOutcome> {
    let mut sinks = Vec::with_capacity(destinations.len());
    for dest in destinations {
        sinks.push(BufWriter::new(File::create(&dest.partial)?));
    }

    let fanout = FanOutWriter::new(sinks);
    let (snapshot, fanout) = write_snapshot(source_dir, fanout, compression_level)?;

    for sink in fanout.into_inner() {
        let file = sink.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }

    let mut paths = Vec::with_capacity(destinations.len());
    for dest in destinations {
        fs::rename(&dest.partial, &dest.target)?;
        paths.push(dest.target.clone());
    }

    let archive_bytes = match paths.first() {
        Some(first) => fs::metadata(first)?.len(),
        None => 0,
    };

    Ok(ArchiveOutcome {
        paths,
        file_count: snapshot.files,
        source_bytes: snapshot.bytes,
        archive_bytes,
    })
}

struct SnapshotStats {
    files: usize,
    bytes: u64,
}

/// Stream every file under `source_dir` into a zstd-compressed tar written
/// to `out`. Returns what was packed and the flushed writer.
fn write_snapshot<W: Write>(
    source_dir: &Path,
    out: W,
    compression_level: i32,
) -> io::Result<(SnapshotStats, W)> {
    let encoder = zstd::Encoder::new(out, compression_level)?;
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let files = walk_directory(source_dir)?;
    for file in &files {
        builder.append_path_with_name(&file.path, &file.relative_path)?;
    }

    let encoder = builder.into_inner()?;
    let mut out = encoder.finish()?;
    out.flush()?;

    let stats = SnapshotStats {
        files: files.len(),
        bytes: files.iter().map(|f| f.size).sum(),
    };
    Ok((stats, out))
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove incomplete archive"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Read;
    use tempfile::TempDir;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap()
    }

    fn source(root: &Path) -> io::Result<PathBuf> {
        let src = root.join("cache/www.example.com");
        fs::create_dir_all(src.join("files/assets"))?;
        fs::write(src.join("files/index.php"), b"<?php echo 1;")?;
        fs::write(src.join("files/assets/app.css"), b"body{}")?;
        fs::write(src.join("dump.sql"), b"CREATE TABLE t;")?;
        Ok(src)
    }

    fn entries(archive: &Path) -> io::Result<Vec<(String, Vec<u8>)>> {
        let decoder = zstd::Decoder::new(File::open(archive)?)?;
        let mut tar = tar::Archive::new(decoder);
        let mut out = Vec::new();
        for entry in tar.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            out.push((name, data));
        }
        Ok(out)
    }

    #[test]
    fn test_one_identical_archive_per_pending_tag() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = source(temp_dir.path())?;
        let archive_dir = temp_dir.path().join("backups/www.example.com");
        let pending = [Granularity::Hourly, Granularity::Daily, Granularity::Yearly];

        let outcome = create_archives(&src, &pending, &archive_dir, "www.example.com", &now(), 3)?;

        assert_eq!(outcome.paths.len(), 3);
        assert_eq!(outcome.file_count, 3);
        assert_eq!(outcome.source_bytes, 13 + 6 + 15);
        assert_eq!(
            outcome.paths[1],
            archive_dir.join("daily_2024-03-05_14-07-09_www.example.com.tar.zst")
        );

        let first = fs::read(&outcome.paths[0])?;
        for path in &outcome.paths[1..] {
            assert_eq!(fs::read(path)?, first);
        }
        assert_eq!(outcome.archive_bytes, first.len() as u64);

        let listed = entries(&outcome.paths[0])?;
        let names: Vec<_> = listed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["dump.sql", "files/assets/app.css", "files/index.php"]);
        assert_eq!(listed[0].1, b"CREATE TABLE t;");

        let leftovers = fs::read_dir(&archive_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[test]
    fn test_empty_pending_writes_nothing() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let archive_dir = temp_dir.path().join("backups");

        let outcome = create_archives(temp_dir.path(), &[], &archive_dir, "h", &now(), 3)?;

        assert!(outcome.paths.is_empty());
        assert!(!archive_dir.exists());
        Ok(())
    }

    #[test]
    fn test_failure_removes_every_destination() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let archive_dir = temp_dir.path().join("backups");
        let missing_source = temp_dir.path().join("does-not-exist");

        let result = create_archives(
            &missing_source,
            &[Granularity::Daily, Granularity::Weekly],
            &archive_dir,
            "h",
            &now(),
            3,
        );

        assert!(matches!(result, Err(BackupError::Archive(_))));
        assert_eq!(fs::read_dir(&archive_dir)?.count(), 0);
        Ok(())
    }
}
