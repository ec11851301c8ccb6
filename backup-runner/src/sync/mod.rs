//! Mirror synchronization: hashing, reconcile and materialize.

pub mod hasher;
pub mod manifest;
pub mod materialize;
pub mod reconcile;

pub use manifest::{ManifestEntry, RemoteManifest};
pub use materialize::{materialize, MaterializeOutcome};
pub use reconcile::{reconcile, ReconcileOutcome};

#[cfg(test)]
mod tests {
    use super::materialize::tests::MemorySource;
    use super::*;
    use crate::api::RemoteSource;
    use crate::fs::walker::walk_directory;
    use crate::Result;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn local_state(root: &std::path::Path) -> Result<HashMap<String, String>> {
        let mut state = HashMap::new();
        for file in walk_directory(root)? {
            state.insert(file.relative_path.clone(), hasher::hash_file(&file.path)?);
        }
        Ok(state)
    }

    #[tokio::test]
    async fn test_reconcile_then_materialize_converges() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let (root, staging) = (temp_dir.path().join("files"), temp_dir.path().join("staging"));
        let root = root.as_path();
        fs::create_dir_all(root)?;

        // Arbitrary pre-existing state: stale, unknown, matching and nested junk.
        fs::write(root.join("a.txt"), b"alpha")?;
        fs::create_dir_all(root.join("b"))?;
        fs::write(root.join("b/d.txt"), b"delta")?;
        fs::create_dir_all(root.join("old/empty/dirs"))?;
        fs::write(root.join("changed.txt"), b"v1")?;
        fs::write(root.join("c.txt.download"), b"interrupted")?;

        let source = MemorySource::with_files(&[
            ("a.txt", b"alpha"),
            ("b/c.txt", b"charlie"),
            ("changed.txt", b"v2"),
            ("deep/er/e.txt", b"echo"),
        ]);
        let manifest = source.fetch_manifest().await?;

        let outcome = reconcile(root, &manifest)?;
        materialize(root, &staging, &outcome.download_queue, &source).await?;

        let expected: HashMap<String, String> = manifest
            .entries()
            .into_iter()
            .map(|e| (e.path, e.hash))
            .collect();
        assert_eq!(local_state(root)?, expected);
        assert!(!root.join("old").exists());

        // a.txt was already satisfied and must not have been fetched again.
        assert!(!source.requests().contains(&"file:a.txt".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let (root, staging) = (temp_dir.path().join("files"), temp_dir.path().join("staging"));
        let root = root.as_path();
        fs::create_dir_all(root)?;
        let source = MemorySource::with_files(&[("x/y.txt", b"y"), ("z.txt", b"z")]);
        let manifest = source.fetch_manifest().await?;

        let first = reconcile(root, &manifest)?;
        materialize(root, &staging, &first.download_queue, &source).await?;
        let second = reconcile(root, &manifest)?;

        assert_eq!(second.kept_files, 2);
        assert_eq!(second.deleted_files, 0);
        assert!(second.download_queue.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_download_suffix_names_are_ordinary_paths() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let (root, staging) = (temp_dir.path().join("files"), temp_dir.path().join("staging"));
        let root = root.as_path();
        fs::create_dir_all(root)?;

        // Already mirrored and listed; downloading its namesake must not touch it.
        fs::write(root.join("foo.download"), b"legit")?;
        let source = MemorySource::with_files(&[("foo", b"fresh"), ("foo.download", b"legit")]);
        let manifest = source.fetch_manifest().await?;

        let outcome = reconcile(root, &manifest)?;
        assert_eq!(outcome.kept_files, 1);
        materialize(root, &staging, &outcome.download_queue, &source).await?;

        assert_eq!(fs::read(root.join("foo"))?, b"fresh");
        assert_eq!(fs::read(root.join("foo.download"))?, b"legit");
        let expected: HashMap<String, String> = manifest
            .entries()
            .into_iter()
            .map(|e| (e.path, e.hash))
            .collect();
        assert_eq!(local_state(root)?, expected);
        Ok(())
    }
}
