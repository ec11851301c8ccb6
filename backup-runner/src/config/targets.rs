//! Target list loading.
//!
//! The list is plain text with one target per line:
//! `https://www.example.com/ <access key>`. Lines that do not look like that
//! (comments, blanks, anything else) are ignored.

use crate::utils::{BackupError, Result};
use regex::Regex;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

const TARGET_PATTERN: &str = r"^\s*(https?://\S+/)\s+(\S.*?)\s*$";

/// One server to back up.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerTarget {
    pub url: Url,
    pub access_key: String,
    /// Host part of `url`; names the cache and archive directories
    pub hostname: String,
}

impl ServerTarget {
    pub fn new(url: &str, access_key: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| BackupError::Config(format!("invalid target URL {}: {}", url, e)))?;
        let hostname = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BackupError::Config(format!("target URL {} has no host", url)))?
            .to_string();
        if !is_directory_name(&hostname) {
            return Err(BackupError::Config(format!(
                "target host {:?} cannot be used as a directory name",
                hostname
            )));
        }

        Ok(Self {
            url,
            access_key: access_key.to_string(),
            hostname,
        })
    }
}

/// The hostname names per-host directories, so it must be a single plain
/// path component.
fn is_directory_name(hostname: &str) -> bool {
    !hostname.starts_with('.') && !hostname.contains(['/', '\\'])
}

// The access key stays out of logs.
impl fmt::Debug for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTarget")
            .field("url", &self.url.as_str())
            .field("access_key", &"***")
            .field("hostname", &self.hostname)
            .finish()
    }
}

/// Parse every matching line of a target list.
pub fn parse_targets(text: &str) -> Result<Vec<ServerTarget>> {
    let pattern = Regex::new(TARGET_PATTERN)
        .map_err(|e| BackupError::Config(format!("target pattern: {}", e)))?;

    let mut targets = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let Some(caps) = pattern.captures(line) else {
            continue;
        };
        match ServerTarget::new(&caps[1], &caps[2]) {
            Ok(target) => targets.push(target),
            Err(e) => warn!(line = index + 1, error = %e, "Skipping target"),
        }
    }
    Ok(targets)
}

/// Read and parse the target list. An unreadable file or one without any
/// target is a configuration error.
pub fn load_targets(path: &Path) -> Result<Vec<ServerTarget>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| BackupError::Config(format!("cannot read {}: {}", path.display(), e)))?;

    let targets = parse_targets(&text)?;
    if targets.is_empty() {
        return Err(BackupError::Config(format!(
            "no targets found in {}",
            path.display()
        )));
    }

    info!(count = targets.len(), file = %path.display(), "Targets loaded");
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_lines() {
        let text = "\
# production
https://www.example.com/ abc123
   http://staging.example.org/sub/    key with spaces
not a target
https://no-trailing-slash.example.com key
";
        let targets = parse_targets(text).unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].hostname, "www.example.com");
        assert_eq!(targets[0].access_key, "abc123");
        assert_eq!(targets[1].url.as_str(), "http://staging.example.org/sub/");
        assert_eq!(targets[1].hostname, "staging.example.org");
        assert_eq!(targets[1].access_key, "key with spaces");
    }

    #[test]
    fn test_line_without_key_is_ignored() {
        assert!(parse_targets("https://www.example.com/\n").unwrap().is_empty());
    }

    #[test]
    fn test_dot_hosts_are_rejected() {
        for url in ["https://../", "https://./", "https://.hidden/"] {
            let err = ServerTarget::new(url, "k").unwrap_err();
            assert!(matches!(err, BackupError::Config(_)), "{url}");
        }
        assert!(ServerTarget::new("https://127.0.0.1:8443/", "k").is_ok());
    }

    #[test]
    fn test_dot_host_line_is_skipped() {
        let targets = parse_targets("https://../ k\nhttps://www.example.com/ k\n").unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].hostname, "www.example.com");
    }

    #[test]
    fn test_debug_hides_key() {
        let target = ServerTarget::new("https://www.example.com/", "s3cret").unwrap();
        let shown = format!("{:?}", target);
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("www.example.com"));
    }

    #[test]
    fn test_load_empty_list_is_config_error() -> std::io::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "# nothing here yet")?;

        let err = load_targets(file.path()).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
        Ok(())
    }

    #[test]
    fn test_load_unreadable_is_config_error() {
        let err = load_targets(Path::new("/nonexistent/servers.txt")).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
    }
}
