//! Backup orchestration.
//!
//! Targets are processed one after another. Within a target every step is
//! awaited before the next starts:
//! 1. list archives, compute the pending set, evict
//! 2. stop here if nothing is pending
//! 3. fetch the manifest, reconcile, materialize
//! 4. fetch the database dump
//! 5. write one archive per pending granularity

pub mod layout;

use crate::api::{ApiClient, RemoteSource};
use crate::archive::{create_archives, ArchiveOutcome};
use crate::config::{load_targets, Config, ServerTarget};
use crate::retention::{Granularity, RetentionPlan, RetentionPolicy};
use crate::sync::materialize::staging_file;
use crate::sync::{materialize, reconcile, MaterializeOutcome, ReconcileOutcome};
use crate::transfer::{format_bytes, format_duration};
use crate::utils::{BackupError, Result, Stage};
use chrono::{Local, NaiveDateTime};
use layout::TargetLayout;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// What happened for one target.
#[derive(Debug)]
pub struct TargetReport {
    pub hostname: String,
    pub pending: Vec<Granularity>,
    pub evicted: usize,
    /// `None` when nothing was pending and the target was skipped
    pub reconcile: Option<ReconcileOutcome>,
    pub materialize: Option<MaterializeOutcome>,
    pub dump_bytes: u64,
    pub archive: Option<ArchiveOutcome>,
    pub elapsed: Duration,
}

impl TargetReport {
    fn skipped(hostname: &str, evicted: usize, started: Instant) -> Self {
        Self {
            hostname: hostname.to_string(),
            pending: Vec::new(),
            evicted,
            reconcile: None,
            materialize: None,
            dump_bytes: 0,
            archive: None,
            elapsed: started.elapsed(),
        }
    }

    pub fn was_skipped(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<TargetReport>,
}

/// Settings shared by every target of a run.
#[derive(Debug, Clone)]
pub struct TargetSettings {
    pub policy: RetentionPolicy,
    pub compression_level: i32,
}

impl From<&Config> for TargetSettings {
    fn from(config: &Config) -> Self {
        Self {
            policy: config.retention.clone(),
            compression_level: config.archive.level(),
        }
    }
}

/// Run `f` on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BackupError::Io(std::io::Error::other(e)))?
}

/// Back up one target.
///
/// `now` is taken once by the caller and used for both the pending set and
/// the archive names.
pub async fn backup_target<S>(
    hostname: &str,
    source: &S,
    layout: &TargetLayout,
    settings: &TargetSettings,
    now: NaiveDateTime,
) -> Result<TargetReport>
where
    S: RemoteSource + ?Sized,
{
    let started = Instant::now();

    layout.ensure().map_err(|e| e.during(hostname, Stage::Prepare))?;

    // 1. Retention
    let plan = {
        let archive_dir = layout.archive_dir.clone();
        let host = hostname.to_string();
        let policy = settings.policy.clone();
        blocking(move || RetentionPlan::prepare(&archive_dir, &host, &policy, &now))
            .await
            .map_err(|e| e.during(hostname, Stage::Retention))?
    };

    // 2. Nothing due
    if !plan.is_due() {
        info!(host = %hostname, "No backup due, skipping");
        return Ok(TargetReport::skipped(hostname, plan.evicted.len(), started));
    }
    let pending_tags: Vec<&str> = plan.pending.iter().map(|g| g.tag()).collect();
    info!(host = %hostname, pending = ?pending_tags, "Backup due");

    // 3. Mirror
    let manifest = source
        .fetch_manifest()
        .await
        .map_err(|e| e.during(hostname, Stage::Manifest))?;

    let reconciled = {
        let files_dir = layout.files_dir.clone();
        blocking(move || reconcile(&files_dir, &manifest))
            .await
            .map_err(|e| e.during(hostname, Stage::Reconcile))?
    };

    let materialized = materialize(
        &layout.files_dir,
        &layout.staging_dir,
        &reconciled.download_queue,
        source,
    )
    .await
    .map_err(|e| e.during(hostname, Stage::Download))?;

    // 4. Database dump
    let dump_bytes = fetch_dump(source, layout)
        .await
        .map_err(|e| e.during(hostname, Stage::Dump))?;

    // 5. Archives
    let archive = {
        let host_dir = layout.host_dir.clone();
        let archive_dir = layout.archive_dir.clone();
        let pending = plan.pending.clone();
        let host = hostname.to_string();
        let level = settings.compression_level;
        blocking(move || create_archives(&host_dir, &pending, &archive_dir, &host, &now, level))
            .await
            .map_err(|e| e.during(hostname, Stage::Archive))?
    };

    Ok(TargetReport {
        hostname: hostname.to_string(),
        pending: plan.pending,
        evicted: plan.evicted.len(),
        reconcile: Some(reconciled),
        materialize: Some(materialized),
        dump_bytes,
        archive: Some(archive),
        elapsed: started.elapsed(),
    })
}

async fn fetch_dump<S>(source: &S, layout: &TargetLayout) -> Result<u64>
where
    S: RemoteSource + ?Sized,
{
    let staged = staging_file(&layout.staging_dir)?;
    let bytes = source.download_dump(&staged).await?;
    staged
        .persist(&layout.dump_file)
        .map_err(|e| BackupError::fs(&layout.dump_file, e.error))?;

    info!(size = %format_bytes(bytes), "Database dump stored");
    Ok(bytes)
}

/// Back up every target in order.
///
/// By default the first failure ends the run. With `continue_on_error` the
/// remaining targets still run and the failures are reported together.
pub async fn run_targets(config: &Config, targets: &[ServerTarget]) -> Result<RunSummary> {
    let settings = TargetSettings::from(config);
    let mut summary = RunSummary::default();
    let mut failed = 0usize;

    for target in targets {
        info!(host = %target.hostname, url = %target.url, "Start backup");

        let result = match ApiClient::new(target, &config.api) {
            Ok(client) => {
                let layout = TargetLayout::new(&config.paths, &target.hostname);
                let now = Local::now().naive_local();
                backup_target(&target.hostname, &client, &layout, &settings, now).await
            }
            Err(e) => Err(e.during(&target.hostname, Stage::Prepare)),
        };

        match result {
            Ok(report) => {
                log_report(&report);
                summary.reports.push(report);
            }
            Err(e) if config.run.continue_on_error => {
                error!(host = %target.hostname, error = %e, "Backup failed, continuing with next target");
                failed += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if failed > 0 {
        return Err(BackupError::TargetsFailed {
            failed,
            total: targets.len(),
        });
    }
    Ok(summary)
}

/// Load the target list and back up every target.
pub async fn run(config: &Config) -> Result<RunSummary> {
    let targets = load_targets(&config.paths.servers_file)?;
    run_targets(config, &targets).await
}

fn log_report(report: &TargetReport) {
    if report.was_skipped() {
        info!(
            host = %report.hostname,
            evicted = report.evicted,
            "Backup not due"
        );
        return;
    }

    let (kept, deleted) = report
        .reconcile
        .as_ref()
        .map(|r| (r.kept_files, r.deleted_files))
        .unwrap_or_default();
    let (downloaded, downloaded_bytes) = report
        .materialize
        .as_ref()
        .map(|m| (m.downloaded_files, m.downloaded_bytes))
        .unwrap_or_default();
    let (archives, source_bytes, archive_bytes) = report
        .archive
        .as_ref()
        .map(|a| (a.paths.len(), a.source_bytes, a.archive_bytes))
        .unwrap_or_default();

    info!(
        host = %report.hostname,
        kept,
        deleted,
        downloaded,
        downloaded_size = %format_bytes(downloaded_bytes),
        dump_size = %format_bytes(report.dump_bytes),
        archives,
        snapshot_size = %format_bytes(source_bytes),
        archive_size = %format_bytes(archive_bytes),
        evicted = report.evicted,
        elapsed = %format_duration(report.elapsed),
        "Backup completed"
    );
}
