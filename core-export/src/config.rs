//! Tunables for the export pipeline.

use std::time::Duration;

use crate::error::{ExportError, Result};

/// Rate-limit retries before a job is failed.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// First rate-limit backoff; doubles on every retry.
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 5_000;
/// Tracks between resolution progress writes.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10;
/// Items between cancellation checkpoints.
pub const DEFAULT_CANCEL_CHECK_INTERVAL: usize = 20;
/// Playlist entries per bulk add request.
pub const DEFAULT_BULK_CHUNK_SIZE: usize = 100;

/// Export processor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    pub max_retries: u32,
    pub base_backoff: Duration,

    pub progress_interval: usize,
    pub cancel_check_interval: usize,
    /// Consecutive cache misses before the resolver pauses.
    pub miss_pacing_threshold: usize,
    pub miss_pacing_delay: Duration,
    pub resolve_progress_floor: u8,
    pub resolve_progress_span: u8,

    pub bulk_chunk_size: usize,
    pub bulk_chunk_delay: Duration,
    pub sequential_item_delay: Duration,
    pub sequential_cancel_interval: usize,
    pub transient_retry_wait: Duration,
    pub write_progress_baseline: u8,
    pub write_progress_span: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            cancel_check_interval: DEFAULT_CANCEL_CHECK_INTERVAL,
            miss_pacing_threshold: 5,
            miss_pacing_delay: Duration::from_millis(1_000),
            resolve_progress_floor: 5,
            resolve_progress_span: 45,
            bulk_chunk_size: DEFAULT_BULK_CHUNK_SIZE,
            bulk_chunk_delay: Duration::from_millis(1_000),
            sequential_item_delay: Duration::from_millis(500),
            sequential_cancel_interval: DEFAULT_CANCEL_CHECK_INTERVAL,
            transient_retry_wait: Duration::from_millis(2_000),
            write_progress_baseline: 50,
            write_progress_span: 50,
        }
    }
}

impl ExportConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    pub fn with_bulk_chunk_size(mut self, size: usize) -> Self {
        self.bulk_chunk_size = size;
        self
    }

    pub fn with_cancel_check_interval(mut self, interval: usize) -> Self {
        self.cancel_check_interval = interval;
        self.sequential_cancel_interval = interval;
        self
    }

    pub fn with_miss_pacing(mut self, threshold: usize, delay: Duration) -> Self {
        self.miss_pacing_threshold = threshold;
        self.miss_pacing_delay = delay;
        self
    }

    /// Zero every pacing sleep. Rate-limit backoff is left alone.
    pub fn without_pacing(mut self) -> Self {
        self.miss_pacing_delay = Duration::ZERO;
        self.bulk_chunk_delay = Duration::ZERO;
        self.sequential_item_delay = Duration::ZERO;
        self.transient_retry_wait = Duration::ZERO;
        self
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bulk_chunk_size == 0 {
            return Err(ExportError::Config(
                "bulk_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.progress_interval == 0
            || self.cancel_check_interval == 0
            || self.sequential_cancel_interval == 0
        {
            return Err(ExportError::Config(
                "progress and cancellation intervals must be at least 1".to_string(),
            ));
        }
        if self.base_backoff.is_zero() {
            return Err(ExportError::Config(
                "base_backoff must be positive".to_string(),
            ));
        }
        if u16::from(self.resolve_progress_floor) + u16::from(self.resolve_progress_span) > 100
            || u16::from(self.write_progress_baseline) + u16::from(self.write_progress_span) > 100
        {
            return Err(ExportError::Config(
                "progress floor plus span cannot exceed 100".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExportConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_backoff, Duration::from_millis(5_000));
        assert_eq!(config.bulk_chunk_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_without_pacing_keeps_backoff() {
        let config = ExportConfig::default().without_pacing();
        assert!(config.bulk_chunk_delay.is_zero());
        assert!(config.sequential_item_delay.is_zero());
        assert_eq!(config.base_backoff, Duration::from_millis(5_000));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ExportConfig::default()
            .with_bulk_chunk_size(0)
            .validate()
            .is_err());
        assert!(ExportConfig::default()
            .with_cancel_check_interval(0)
            .validate()
            .is_err());
        assert!(ExportConfig::default()
            .with_base_backoff(Duration::ZERO)
            .validate()
            .is_err());

        let mut config = ExportConfig::default();
        config.resolve_progress_span = 96;
        assert!(config.validate().is_err());
    }
}
