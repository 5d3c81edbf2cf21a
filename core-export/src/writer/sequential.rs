use super::{complete_job, create_playlist, pause, write_progress, PlaylistWriter, WriteOutcome, WriteRequest};
use crate::{ExportConfig, ExportError, ProgressReporter, RateLimitedClient, Result};
use async_trait::async_trait;
use bridge_traits::http::{HttpResponse, STATUS_TOO_MANY_REQUESTS};
use bridge_traits::platform::{PlatformApi, PlatformRef};
use core_auth::AccessToken;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const STATUS_CONFLICT: u16 = 409;
const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

/// Responses worth one more attempt after a short wait.
fn is_transient(response: &HttpResponse) -> bool {
    matches!(
        response.status,
        STATUS_CONFLICT | STATUS_SERVICE_UNAVAILABLE | STATUS_TOO_MANY_REQUESTS
    )
}

/// Writer for platforms that add one reference per call under a strict
/// request quota.
pub struct SequentialWriter {
    api: Arc<dyn PlatformApi>,
    client: RateLimitedClient,
    config: ExportConfig,
}

impl SequentialWriter {
    pub(crate) fn new(api: Arc<dyn PlatformApi>, client: RateLimitedClient, config: ExportConfig) -> Self {
        Self {
            api,
            client,
            config,
        }
    }

    /// Add one reference. `Ok(false)` means the item was given up on.
    async fn add_one(
        &self,
        playlist_id: &str,
        reference: &PlatformRef,
        token: &AccessToken,
        reporter: &ProgressReporter,
    ) -> Result<bool> {
        let items = std::slice::from_ref(reference);

        for attempt in 0..2 {
            let request = self
                .api
                .add_items_request(token.secret(), playlist_id, items)?;

            let response = match self.client.execute(request, reporter).await {
                Ok(response) => response,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(reference = %reference, error = %e, "Add failed");
                    return Ok(false);
                }
            };

            if response.is_success() {
                return Ok(true);
            }

            if attempt == 0 && is_transient(&response) {
                debug!(reference = %reference, status = response.status, "Transient add failure, retrying once");
                pause(self.config.transient_retry_wait).await;
                continue;
            }

            warn!(reference = %reference, status = response.status, "Platform rejected item");
            return Ok(false);
        }

        Ok(false)
    }
}

#[async_trait]
impl PlaylistWriter for SequentialWriter {
    #[instrument(skip_all, fields(job_id = %reporter.job_id(), refs = request.refs.len()))]
    async fn write(
        &self,
        request: WriteRequest<'_>,
        reporter: &ProgressReporter,
    ) -> Result<WriteOutcome> {
        let created = create_playlist(
            self.api.as_ref(),
            &self.client,
            &request,
            reporter,
            self.config.write_progress_baseline,
        )
        .await?;

        let total = request.refs.len();
        let mut added = 0u32;
        let mut failed = 0u32;

        for (index, reference) in request.refs.iter().enumerate() {
            if index % self.config.sequential_cancel_interval == 0 && reporter.is_cancelled().await? {
                info!(index, "Cancellation observed while adding items");
                return Err(ExportError::Cancelled);
            }

            if self
                .add_one(&created.id, reference, request.access_token, reporter)
                .await?
            {
                added += 1;
            } else {
                failed += 1;
            }

            reporter
                .report_counts(
                    write_progress(&self.config, index + 1, total),
                    format!("adding tracks ({}/{})", index + 1, total),
                    added,
                    request.resolution_failures.saturating_add(failed),
                )
                .await?;

            pause(self.config.sequential_item_delay).await;
        }

        complete_job(reporter, created, added, failed, request.resolution_failures).await
    }
}
