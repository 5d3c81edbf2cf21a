//! Progress and cancellation reporting for one running job.
//!
//! Every component in the pipeline writes progress through a
//! [`ProgressReporter`] and asks it whether the job was cancelled. The
//! reporter never caches status: each [`is_cancelled`](ProgressReporter::is_cancelled)
//! call reads the store, since cancellation arrives from another process.

use crate::{ExportJobId, ExportJobStore, ExportStatus, JobUpdate, Result};
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, ExportEvent};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ProgressReporter {
    job_id: ExportJobId,
    store: Arc<dyn ExportJobStore>,
    events: Option<EventBus>,
    clock: Arc<dyn Clock>,
    /// Highest progress written so far.
    high_water: Arc<AtomicU8>,
}

impl ProgressReporter {
    pub fn new(job_id: ExportJobId, store: Arc<dyn ExportJobStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            job_id,
            store,
            events: None,
            clock,
            high_water: Arc::new(AtomicU8::new(0)),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn job_id(&self) -> &ExportJobId {
        &self.job_id
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Persist progress and a step description.
    ///
    /// Progress never moves backwards: a value below the last one written is
    /// raised to it. Returns `false` if the job is already terminal.
    pub async fn report(&self, progress: u8, step: impl Into<String>) -> Result<bool> {
        self.report_update(progress, step.into(), None).await
    }

    /// Like [`report`](Self::report), also persisting running counts.
    pub async fn report_counts(
        &self,
        progress: u8,
        step: impl Into<String>,
        exported: u32,
        failed: u32,
    ) -> Result<bool> {
        self.report_update(progress, step.into(), Some((exported, failed)))
            .await
    }

    async fn report_update(
        &self,
        progress: u8,
        step: String,
        counts: Option<(u32, u32)>,
    ) -> Result<bool> {
        let progress = self.monotonic(progress);
        let mut update = JobUpdate::new().with_progress(progress).with_step(step.clone());
        if let Some((exported, failed)) = counts {
            update = update.with_counts(exported, failed);
        }

        let written = self.persist(update).await?;
        if written {
            debug!(job_id = %self.job_id, progress, step = %step, "Progress");
            self.emit(ExportEvent::Progress {
                job_id: self.job_id.to_string(),
                progress,
                step,
            });
        }
        Ok(written)
    }

    fn monotonic(&self, progress: u8) -> u8 {
        let progress = progress.min(100);
        self.high_water
            .fetch_max(progress, Ordering::SeqCst)
            .max(progress)
    }

    /// Write an arbitrary patch to this job.
    pub async fn persist(&self, update: JobUpdate) -> Result<bool> {
        if let Some(progress) = update.progress {
            self.high_water.fetch_max(progress, Ordering::SeqCst);
        }
        self.store.update(&self.job_id, &update).await
    }

    /// Re-read the job's status and report whether it was cancelled.
    pub async fn is_cancelled(&self) -> Result<bool> {
        let status = self.store.get_status(&self.job_id).await?;
        Ok(status == ExportStatus::Cancelled)
    }

    /// Persist retry telemetry before sleeping on a rate limit.
    pub async fn record_rate_limit(&self, retry_count: u32, backoff: Duration) -> Result<()> {
        let now = self.clock.now();
        let backoff_ms = i64::try_from(backoff.as_millis()).unwrap_or(i64::MAX);
        let next_retry_at = self.clock.unix_timestamp_millis().saturating_add(backoff_ms);
        let wait_secs = (backoff.as_millis() + 999) / 1000;

        let update = JobUpdate::new()
            .with_step(format!("rate limited, retrying in {}s", wait_secs))
            .with_retry(
                retry_count,
                next_retry_at,
                format!("rate limited at {}", now.to_rfc3339()),
            );

        if !self.persist(update).await? {
            warn!(job_id = %self.job_id, "Rate limit telemetry not persisted, job is terminal");
        }

        self.emit(ExportEvent::RateLimited {
            job_id: self.job_id.to_string(),
            retry_count,
            retry_in_ms: u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
        });
        Ok(())
    }

    pub fn emit(&self, event: ExportEvent) {
        if let Some(events) = &self.events {
            events.publish(CoreEvent::Export(event));
        }
    }
}
