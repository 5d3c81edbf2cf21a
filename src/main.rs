//! Export worker (export-worker) - Main entry point
//!
//! Claims pending playlist export jobs from the shared SQLite database and
//! runs them until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bridge_traits::time::LogLevel;
use clap::Parser;
use core_runtime::config::CoreConfig;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::ExportService;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Command-line arguments for export-worker
#[derive(Parser, Debug)]
#[command(name = "export-worker")]
#[command(about = "Background worker exporting song collections to music platforms")]
#[command(version)]
struct Args {
    /// SQLite database shared with the request layer
    #[arg(short, long, env = "EXPORT_DATABASE")]
    database: PathBuf,

    /// Delay between claim attempts when no job is pending
    #[arg(long, default_value = "5000", env = "EXPORT_POLL_INTERVAL_MS")]
    poll_interval_ms: u64,

    /// Jobs processed at once
    #[arg(long, default_value = "2", env = "EXPORT_MAX_CONCURRENT_JOBS")]
    max_concurrent_jobs: usize,

    /// Timeout for a single platform request
    #[arg(long, default_value = "30", env = "EXPORT_HTTP_TIMEOUT_SECS")]
    http_timeout_secs: u64,

    /// Log output: pretty, json or compact
    #[arg(long, default_value = "pretty", env = "EXPORT_LOG_FORMAT")]
    log_format: LogFormat,

    /// Minimum level for workspace crates
    #[arg(long, default_value = "info", env = "EXPORT_LOG_LEVEL")]
    log_level: LogLevel,

    /// Full `tracing` filter replacing the defaults, e.g. `info,core_export=trace`
    #[arg(long, env = "EXPORT_LOG_FILTER")]
    log_filter: Option<String>,
}

impl Args {
    fn logging(&self) -> LoggingConfig {
        let config = LoggingConfig::default()
            .with_format(self.log_format)
            .with_level(self.log_level);
        match &self.log_filter {
            Some(filter) => config.with_filter(filter.clone()),
            None => config,
        }
    }

    fn core_config(&self) -> Result<CoreConfig> {
        CoreConfig::builder()
            .database_path(self.database.clone())
            .worker_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .max_concurrent_jobs(self.max_concurrent_jobs)
            .http_timeout(Duration::from_secs(self.http_timeout_secs))
            .logging(self.logging())
            .build()
            .context("Invalid worker configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.core_config()?;

    init_logging(config.logging.clone()).context("Failed to initialize logging")?;

    info!(
        database = %config.database_path.display(),
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Starting export worker"
    );

    let service = ExportService::bootstrap(config)
        .await
        .context("Failed to bootstrap export service")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    if let Err(e) = service.run_worker(shutdown).await {
        error!(error = %e, "Export worker failed");
        return Err(e.into());
    }

    info!("Export worker shutdown complete");
    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }

    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["export-worker", "--database", "exports.db"]).unwrap();
        let config = args.core_config().unwrap();

        assert_eq!(config.database_path, PathBuf::from("exports.db"));
        assert_eq!(config.worker_poll_interval, Duration::from_secs(5));
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_args_reject_zero_concurrency() {
        let args = Args::try_parse_from([
            "export-worker",
            "--database",
            "exports.db",
            "--max-concurrent-jobs",
            "0",
        ])
        .unwrap();

        assert!(args.core_config().is_err());
    }

    #[test]
    fn test_args_parse_log_options() {
        let args = Args::try_parse_from([
            "export-worker",
            "--database",
            "exports.db",
            "--log-format",
            "json",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.log_format, LogFormat::Json);
        assert_eq!(args.log_level, LogLevel::Debug);
    }
}
