//! Backup Runner Library
//!
//! Mirrors remote application servers by content hash, fetches their
//! database dump and keeps calendar-bucketed `.tar.zst` archives with
//! per-granularity retention.

pub mod api;
pub mod archive;
pub mod config;
pub mod executor;
pub mod fs;
pub mod retention;
pub mod scheduler;
pub mod sync;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::{BackupError, Result};
