//! Deterministic directory listing.
//!
//! Produces every regular file below a root in a stable order, with the
//! `/`-separated relative path used by manifests and archive entries.

use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Information about a file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root, `/`-separated
    pub relative_path: String,

    /// File size in bytes
    pub size: u64,
}

/// Walk a directory tree and collect all regular files, sorted by name at
/// every level. Symlinks are neither followed nor listed.
///
/// # Example
/// ```no_run
/// use backup_runner::fs::walker::walk_directory;
/// use std::path::Path;
///
/// let files = walk_directory(Path::new("cache/example.com")).unwrap();
/// println!("Found {} files", files.len());
/// ```
pub fn walk_directory(root: &Path) -> io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative_path = relative_name(entry.path(), root);
        let size = entry.metadata()?.len();

        files.push(FileInfo {
            path: entry.path().to_path_buf(),
            relative_path,
            size,
        });
    }

    Ok(files)
}

fn relative_name(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_directory(temp_dir.path())?;
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories_in_order() -> io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("b.txt"), b"content1")?;
        fs::write(temp_dir.path().join("a.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let files = walk_directory(temp_dir.path())?;
        let names: Vec<_> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "subdir/file2.txt"]);
        assert_eq!(files[2].size, 8);

        Ok(())
    }
}
