use super::{complete_job, create_playlist, pause, to_u32, write_progress, PlaylistWriter, WriteOutcome, WriteRequest};
use crate::{ExportConfig, ExportError, ProgressReporter, RateLimitedClient, Result};
use async_trait::async_trait;
use bridge_traits::platform::{PlatformApi, PlatformRef};
use core_auth::AccessToken;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Writer for platforms that accept many references per add call.
pub struct BulkWriter {
    api: Arc<dyn PlatformApi>,
    client: RateLimitedClient,
    config: ExportConfig,
}

impl BulkWriter {
    pub(crate) fn new(api: Arc<dyn PlatformApi>, client: RateLimitedClient, config: ExportConfig) -> Self {
        Self {
            api,
            client,
            config,
        }
    }

    fn chunk_size(&self) -> usize {
        self.config
            .bulk_chunk_size
            .min(self.api.max_items_per_add())
            .max(1)
    }

    async fn add_chunk(
        &self,
        playlist_id: &str,
        chunk: &[PlatformRef],
        token: &AccessToken,
        reporter: &ProgressReporter,
    ) -> Result<()> {
        let request = self
            .api
            .add_items_request(token.secret(), playlist_id, chunk)?;
        let response = self.client.execute(request, reporter).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(ExportError::Platform {
                status: response.status,
                message: response.text().unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl PlaylistWriter for BulkWriter {
    #[instrument(skip_all, fields(job_id = %reporter.job_id(), refs = request.refs.len()))]
    async fn write(
        &self,
        request: WriteRequest<'_>,
        reporter: &ProgressReporter,
    ) -> Result<WriteOutcome> {
        let baseline = self.config.write_progress_baseline;
        let created = create_playlist(
            self.api.as_ref(),
            &self.client,
            &request,
            reporter,
            baseline,
        )
        .await?;

        let chunks: Vec<&[PlatformRef]> = request.refs.chunks(self.chunk_size()).collect();
        let total_chunks = chunks.len();
        let mut added = 0u32;
        let mut failed = 0u32;

        for (index, chunk) in chunks.into_iter().enumerate() {
            if reporter.is_cancelled().await? {
                info!(chunk = index, "Cancellation observed before chunk");
                return Err(ExportError::Cancelled);
            }

            match self
                .add_chunk(&created.id, chunk, request.access_token, reporter)
                .await
            {
                Ok(()) => added += to_u32(chunk.len()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(chunk = index, size = chunk.len(), error = %e, "Chunk add failed");
                    failed += to_u32(chunk.len());
                }
            }

            reporter
                .report_counts(
                    write_progress(&self.config, index + 1, total_chunks),
                    format!("adding tracks (batch {}/{})", index + 1, total_chunks),
                    added,
                    request.resolution_failures.saturating_add(failed),
                )
                .await?;

            if index + 1 < total_chunks {
                pause(self.config.bulk_chunk_delay).await;
            }
        }

        complete_job(reporter, created, added, failed, request.resolution_failures).await
    }
}
