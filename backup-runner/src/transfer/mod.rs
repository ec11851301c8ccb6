//! Streaming downloads to disk and human-readable transfer figures.

use crate::utils::{BackupError, Result};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Write a byte stream to `dest` chunk by chunk.
///
/// The whole body is never buffered in memory. The file is flushed and
/// synced before returning the number of bytes written.
pub async fn stream_to_file<S, E>(stream: S, dest: &Path) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<BackupError>,
{
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| BackupError::fs(dest, e))?;
    let mut written = 0u64;

    futures_util::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| -> BackupError { e.into() })?;
        file.write_all(&chunk)
            .await
            .map_err(|e| BackupError::fs(dest, e))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| BackupError::fs(dest, e))?;
    file.sync_all().await.map_err(|e| BackupError::fs(dest, e))?;

    Ok(written)
}

/// Human-readable size, e.g. `1.50 MB`. Plain bytes are shown without
/// decimals.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Elapsed time at second resolution: `42s`, `3m 05s`, `1h 02m`.
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, secs % 3600 / 60),
    }
}
