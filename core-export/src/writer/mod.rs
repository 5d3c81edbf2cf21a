//! # Playlist Writers
//!
//! Create the destination playlist and fill it with resolved references.
//!
//! Platforms differ in how tracks can be added, so the population policy is
//! a trait with one implementation per [`PlatformCapability`]:
//!
//! - [`BulkWriter`]: many references per add call, sent in paced chunks
//! - [`SequentialWriter`]: one reference per call, paced per item, with a
//!   single retry on transient responses
//!
//! Both share playlist creation and the final completion write. Only a
//! failed playlist creation, retry exhaustion or a job store failure aborts
//! the job; a rejected add is counted and skipped.

mod bulk;
mod sequential;

pub use bulk::BulkWriter;
pub use sequential::SequentialWriter;

use crate::{ExportConfig, ExportError, JobUpdate, ProgressReporter, RateLimitedClient, Result};
use async_trait::async_trait;
use bridge_traits::platform::{CreatedPlaylist, PlatformApi, PlatformCapability, PlatformRef, PlaylistDetails};
use core_auth::AccessToken;
use core_runtime::events::ExportEvent;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Input to a writer.
pub struct WriteRequest<'a> {
    /// Matched references in export order.
    pub refs: &'a [PlatformRef],
    pub details: &'a PlaylistDetails,
    pub access_token: &'a AccessToken,
    /// Tracks that never reached the writer because resolution failed.
    pub resolution_failures: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub created: CreatedPlaylist,
    pub added: u32,
    /// References the platform refused.
    pub failed: u32,
}

#[async_trait]
pub trait PlaylistWriter: Send + Sync {
    /// Create the playlist, add every reference, and mark the job completed.
    ///
    /// # Errors
    ///
    /// - [`ExportError::Cancelled`] when a checkpoint observes cancellation
    /// - [`ExportError::PlaylistCreation`] when the playlist cannot be created
    /// - fatal errors from the rate-limited client or the job store
    async fn write(
        &self,
        request: WriteRequest<'_>,
        reporter: &ProgressReporter,
    ) -> Result<WriteOutcome>;
}

/// Pick the writer matching the platform's capability.
pub(crate) fn writer_for(
    api: Arc<dyn PlatformApi>,
    client: RateLimitedClient,
    config: ExportConfig,
) -> Box<dyn PlaylistWriter> {
    match api.platform().capability() {
        PlatformCapability::BulkBatch => Box::new(BulkWriter::new(api, client, config)),
        PlatformCapability::SequentialQuota => {
            Box::new(SequentialWriter::new(api, client, config))
        }
    }
}

/// Create the destination playlist and persist its id and URL right away,
/// so a job that fails later still links to what was built.
pub(crate) async fn create_playlist(
    api: &dyn PlatformApi,
    client: &RateLimitedClient,
    request: &WriteRequest<'_>,
    reporter: &ProgressReporter,
    progress: u8,
) -> Result<CreatedPlaylist> {
    reporter.report(progress, "creating playlist").await?;

    let http_request = api
        .create_playlist_request(request.access_token.secret(), request.details)
        .map_err(|e| ExportError::PlaylistCreation(e.to_string()))?;

    let response = client
        .execute(http_request, reporter)
        .await
        .map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                ExportError::PlaylistCreation(e.to_string())
            }
        })?;

    if !response.is_success() {
        return Err(ExportError::PlaylistCreation(format!(
            "HTTP {}: {}",
            response.status,
            response.text().unwrap_or_default()
        )));
    }

    let created = api
        .parse_created_playlist(&response)
        .map_err(|e| ExportError::PlaylistCreation(e.to_string()))?;

    reporter
        .persist(JobUpdate::new().with_external_playlist(&created.id, &created.url))
        .await?;
    reporter.emit(ExportEvent::PlaylistCreated {
        job_id: reporter.job_id().to_string(),
        playlist_id: created.id.clone(),
        playlist_url: created.url.clone(),
    });
    info!(job_id = %reporter.job_id(), playlist_id = %created.id, "Playlist created");

    Ok(created)
}

/// Write the terminal `completed` patch.
///
/// Returns [`ExportError::Cancelled`] if the job was cancelled after the
/// last checkpoint, leaving the cancellation in place.
pub(crate) async fn complete_job(
    reporter: &ProgressReporter,
    created: CreatedPlaylist,
    added: u32,
    failed: u32,
    resolution_failures: u32,
) -> Result<WriteOutcome> {
    let now = reporter.clock().unix_timestamp();
    let total_failed = resolution_failures.saturating_add(failed);

    if !reporter
        .persist(JobUpdate::completed(added, total_failed, now))
        .await?
    {
        warn!(job_id = %reporter.job_id(), "Job left processing before completion was written");
        return Err(ExportError::Cancelled);
    }

    reporter.emit(ExportEvent::Completed {
        job_id: reporter.job_id().to_string(),
        exported_tracks: added,
        failed_tracks: total_failed,
        playlist_url: Some(created.url.clone()),
    });

    Ok(WriteOutcome {
        created,
        added,
        failed,
    })
}

/// `baseline + done * span / total`, capped at 100.
pub(crate) fn write_progress(config: &ExportConfig, done: usize, total: usize) -> u8 {
    let baseline = usize::from(config.write_progress_baseline);
    let span = usize::from(config.write_progress_span);
    let value = baseline + done * span / total.max(1);
    u8::try_from(value.min(100)).unwrap_or(100)
}

pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
