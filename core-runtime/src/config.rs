//! # Core Configuration Module
//!
//! Runtime settings for the export worker.
//!
//! ## Overview
//!
//! `CoreConfig` is assembled with a builder and validated before use, so a
//! bad flag or environment variable fails at startup rather than on the
//! first claimed job.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/export/exports.db")
//!     .worker_poll_interval(Duration::from_secs(2))
//!     .max_concurrent_jobs(4)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.max_concurrent_jobs, 4);
//! ```
//!
//! Missing required values produce actionable errors:
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing database path");
//! ```

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for a single platform HTTP request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay between claim attempts when the queue is empty.
pub const DEFAULT_WORKER_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of jobs one worker runs at once.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

const MAX_CONCURRENT_JOBS_LIMIT: usize = 64;

/// Core configuration for the export worker.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Timeout applied to each outbound platform request
    pub http_timeout: Duration,

    /// How long the worker waits before polling an empty queue again
    pub worker_poll_interval: Duration,

    /// Upper bound on jobs processed concurrently by one worker
    pub max_concurrent_jobs: usize,

    pub logging: LoggingConfig,
}

impl CoreConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - HTTP timeout and poll interval are non-zero
    /// - Concurrency is between 1 and 64
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.http_timeout.is_zero() {
            return Err(Error::Config(
                "HTTP timeout must be greater than zero".to_string(),
            ));
        }

        if self.worker_poll_interval.is_zero() {
            return Err(Error::Config(
                "Worker poll interval must be greater than zero".to_string(),
            ));
        }

        if self.max_concurrent_jobs == 0 || self.max_concurrent_jobs > MAX_CONCURRENT_JOBS_LIMIT {
            return Err(Error::Config(format!(
                "max_concurrent_jobs must be between 1 and {}, got {}",
                MAX_CONCURRENT_JOBS_LIMIT, self.max_concurrent_jobs
            )));
        }

        Ok(())
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    http_timeout: Option<Duration>,
    worker_poll_interval: Option<Duration>,
    max_concurrent_jobs: Option<usize>,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/exports.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    pub fn worker_poll_interval(mut self, interval: Duration) -> Self {
        self.worker_poll_interval = Some(interval);
        self
    }

    pub fn max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.max_concurrent_jobs = Some(jobs);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the database path is missing or any
    /// value fails [`CoreConfig::validate`].
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let config = CoreConfig {
            database_path,
            http_timeout: self.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT),
            worker_poll_interval: self
                .worker_poll_interval
                .unwrap_or(DEFAULT_WORKER_POLL_INTERVAL),
            max_concurrent_jobs: self
                .max_concurrent_jobs
                .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS),
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
