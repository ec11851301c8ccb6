//! HTTP client for the remote backup endpoints.

use super::RemoteSource;
use crate::config::{ApiConfig, ServerTarget};
use crate::sync::manifest::RemoteManifest;
use crate::transfer::stream_to_file;
use crate::utils::{BackupError, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// reqwest-backed [`RemoteSource`] for a single target.
pub struct ApiClient {
    client: reqwest::Client,
    base: Url,
    key: String,
    hostname: String,
}

impl ApiClient {
    /// Create a client for `target`. No request timeout is applied; a hung
    /// call blocks the run.
    pub fn new(target: &ServerTarget, api: &ApiConfig) -> Result<Self> {
        let base = target
            .url
            .join(&api.path_prefix)
            .map_err(|e| BackupError::Config(format!("invalid API prefix {:?}: {}", api.path_prefix, e)))?;

        let client = reqwest::Client::builder()
            .user_agent(api.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base,
            key: target.access_key.clone(),
            hostname: target.hostname.clone(),
        })
    }

    /// Build `{base}{endpoint}?{params}&key=K`.
    fn endpoint(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base
            .join(endpoint)
            .map_err(|e| BackupError::Config(format!("invalid endpoint {}: {}", endpoint, e)))?;
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params {
                query.append_pair(name, value);
            }
            query.append_pair("key", &self.key);
        }
        Ok(url)
    }

    /// GET a URL and fail on anything but a 2xx status.
    async fn get(&self, endpoint: &str, url: Url) -> Result<reqwest::Response> {
        debug!(host = %self.hostname, endpoint, "GET");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(BackupError::Network(format!(
            "{} on {} returned {}: {}",
            endpoint,
            self.hostname,
            status,
            body.trim()
        )))
    }
}

#[async_trait]
impl RemoteSource for ApiClient {
    async fn fetch_manifest(&self) -> Result<RemoteManifest> {
        let url = self.endpoint("list", &[])?;
        info!(host = %self.hostname, "Fetching file list");

        let body = self.get("list", url).await?.bytes().await?;
        let manifest = RemoteManifest::from_json(&body)?;

        info!(host = %self.hostname, files = manifest.len(), "File list received");
        Ok(manifest)
    }

    async fn download_file(&self, name: &str, dest: &Path) -> Result<u64> {
        let url = self.endpoint("file", &[("name", name)])?;
        info!(host = %self.hostname, file = %name, "Download");

        let response = self.get("file", url).await?;
        stream_to_file(response.bytes_stream(), dest).await
    }

    async fn download_dump(&self, dest: &Path) -> Result<u64> {
        let url = self.endpoint("dumpdb", &[])?;
        info!(host = %self.hostname, "Dump database");

        let response = self.get("dumpdb", url).await?;
        stream_to_file(response.bytes_stream(), dest).await
    }
}
