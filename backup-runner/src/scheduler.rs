//! Cron mode: repeat the run on a schedule until SIGINT/SIGTERM.
//!
//! The target list is re-read on every tick. A tick that fires while the
//! previous run is still going is skipped, so runs never overlap.

use crate::config::Config;
use crate::executor;
use crate::utils::{BackupError, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

pub struct BackupScheduler {
    scheduler: JobScheduler,
    config: Arc<Config>,
    running: Arc<Mutex<()>>,
}

impl BackupScheduler {
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
        Ok(Self {
            scheduler,
            config,
            running: Arc::new(Mutex::new(())),
        })
    }

    /// Register the backup run under `cron_expression` (6 fields, seconds
    /// first).
    pub async fn schedule(&self, cron_expression: &str) -> Result<()> {
        let config = self.config.clone();
        let running = self.running.clone();

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let config = config.clone();
            let running = running.clone();
            Box::pin(async move {
                let Ok(_guard) = running.try_lock_owned() else {
                    warn!("Skipping scheduled run: previous run still in progress");
                    return;
                };

                info!("Starting scheduled backup run");
                match executor::run(&config).await {
                    Ok(summary) => info!(targets = summary.reports.len(), "Scheduled backup run finished"),
                    Err(e) => error!(error = %e, "Scheduled backup run failed"),
                }
            })
        })
        .map_err(|e| BackupError::Scheduler(format!("invalid schedule {:?}: {}", cron_expression, e)))?;

        self.scheduler.add(job).await.map_err(scheduler_error)?;
        info!(cron = %cron_expression, "Backup run scheduled");
        Ok(())
    }

    /// Start ticking and block until a shutdown signal arrives.
    pub async fn run_until_shutdown(mut self) -> Result<()> {
        self.scheduler.start().await.map_err(scheduler_error)?;

        shutdown_signal().await;

        self.scheduler.shutdown().await.map_err(scheduler_error)?;
        // Let an in-flight run finish before returning.
        let _idle = self.running.lock().await;
        info!("Scheduler stopped");
        Ok(())
    }
}

fn scheduler_error(e: impl std::fmt::Display) -> BackupError {
    BackupError::Scheduler(e.to_string())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down scheduler"),
        _ = terminate => info!("Received SIGTERM, shutting down scheduler"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_cron_is_rejected() {
        let scheduler = BackupScheduler::new(Arc::new(Config::default())).await.unwrap();
        let err = scheduler.schedule("every now and then").await.unwrap_err();
        assert!(matches!(err, BackupError::Scheduler(_)));
    }

    #[tokio::test]
    async fn test_valid_cron_is_accepted() {
        let scheduler = BackupScheduler::new(Arc::new(Config::default())).await.unwrap();
        scheduler.schedule("0 0 * * * *").await.unwrap();
    }
}
