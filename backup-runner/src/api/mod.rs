//! Remote API access.
//!
//! Each target exposes three endpoints under `{url}{path_prefix}`:
//! - `list?key=K` - JSON array of `[relative_path, md5]` pairs
//! - `file?name=N&key=K` - raw file bytes
//! - `dumpdb?key=K` - raw database dump
//!
//! The rest of the crate only sees the [`RemoteSource`] trait, so tests can
//! substitute an in-memory source.

pub mod client;

use crate::sync::manifest::RemoteManifest;
use crate::Result;
use async_trait::async_trait;
use std::path::Path;

pub use client::ApiClient;

/// Where the mirror and the database dump come from.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch the manifest of files the mirror should contain.
    async fn fetch_manifest(&self) -> Result<RemoteManifest>;

    /// Download one file by its manifest path into `dest`.
    /// Returns the number of bytes written.
    async fn download_file(&self, name: &str, dest: &Path) -> Result<u64>;

    /// Download a fresh database dump into `dest`.
    async fn download_dump(&self, dest: &Path) -> Result<u64>;
}
