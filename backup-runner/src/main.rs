//! Backup Runner - Main entry point
//!
//! Backs up every server in the target list once, or repeatedly on a cron
//! schedule.

use anyhow::Result;
use backup_runner::{config::Config, executor, scheduler::BackupScheduler, utils};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target list (overrides config)
    #[arg(short, long, value_name = "FILE")]
    servers: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Cron expression with seconds, e.g. "0 0 * * * *" (overrides config)
    #[arg(long)]
    schedule: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(servers) = args.servers {
        config.paths.servers_file = servers;
    }
    if let Some(schedule) = args.schedule {
        config.run.schedule = Some(schedule);
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!("Starting backup-runner v{}", env!("CARGO_PKG_VERSION"));

    let outcome = match config.run.schedule.clone() {
        Some(cron) => run_scheduled(config, &cron).await,
        None => executor::run(&config).await.map(|_| ()),
    };

    if let Err(e) = outcome {
        tracing::error!(error = %e, "Backup run failed");
        std::process::exit(1);
    }

    Ok(())
}

async fn run_scheduled(config: Config, cron: &str) -> backup_runner::Result<()> {
    let scheduler = BackupScheduler::new(Arc::new(config)).await?;
    scheduler.schedule(cron).await?;
    scheduler.run_until_shutdown().await
}
