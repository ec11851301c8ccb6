//! Remote manifest types.
//!
//! The remote lists every file it wants mirrored as a JSON array of
//! `[relative_path, md5_hex]` pairs.

use std::collections::HashMap;
use tracing::warn;

/// One file the remote says the mirror should contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub hash: String,
}

/// Remote-authoritative listing, keyed by relative path.
#[derive(Debug, Clone, Default)]
pub struct RemoteManifest {
    entries: HashMap<String, String>,
}

impl RemoteManifest {
    /// Build a manifest from `(path, hash)` pairs. A repeated path keeps
    /// its last hash.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut entries = HashMap::new();
        for (path, hash) in pairs {
            if let Some(previous) = entries.insert(path.clone(), hash) {
                warn!(path = %path, previous = %previous, "Duplicate manifest entry, keeping the last one");
            }
        }
        Self { entries }
    }

    /// Parse the JSON body returned by the list endpoint.
    pub fn from_json(body: &[u8]) -> serde_json::Result<Self> {
        let pairs: Vec<(String, String)> = serde_json::from_slice(body)?;
        Ok(Self::from_pairs(pairs))
    }

    /// Expected hash for a relative path, if listed.
    pub fn hash_of(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, sorted by path.
    pub fn entries(&self) -> Vec<ManifestEntry> {
        let mut entries: Vec<ManifestEntry> = self
            .entries
            .iter()
            .map(|(path, hash)| ManifestEntry {
                path: path.clone(),
                hash: hash.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }
}
