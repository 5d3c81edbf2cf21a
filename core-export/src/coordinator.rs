//! # Export Coordinator
//!
//! Claims export jobs and drives each one through its phases:
//!
//! ```text
//! claim ─→ credentials ─→ load tracks ─→ resolve ─→ create + populate ─→ completed
//!                │              │            │               │
//!                └──────────────┴────────────┴───────────────┴──→ failed / cancelled
//! ```
//!
//! ## Error Boundary
//!
//! [`ExportCoordinator::run_job`] is the only place a job is moved to
//! `failed` for an error raised while processing. Every phase returns
//! `Result` and propagates fatal errors with `?`; panics are caught at the
//! same boundary, so a job never stays in `processing` because of a bug in
//! one phase. A cancellation observed at a checkpoint is not an error: the
//! status written by the cancelling request is left untouched.
//!
//! ## Concurrency
//!
//! Each claimed job runs as one task on a [`TaskTracker`]. Jobs never share
//! state; the store's atomic claim keeps two workers off the same job.

use crate::writer::{writer_for, WriteRequest};
use crate::{
    BackoffPolicy, ExportConfig, ExportError, ExportJob, ExportJobId, ExportJobStore,
    ExportRequest, ExportStatus, JobUpdate, ProgressReporter, RateLimitedClient, Resolution,
    Result, TrackResolver,
};
use bridge_traits::{
    http::HttpClient,
    platform::{MusicPlatform, PlatformApi},
    time::{Clock, SystemClock},
};
use core_auth::CredentialProvider;
use core_library::{TrackIdentityCache, TrackSource};
use core_runtime::events::{EventBus, ExportEvent};
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn};

/// Progress written once the source tracks are loaded.
const LOADING_PROGRESS: u8 = 2;

// ============================================================================
// Platform Registry
// ============================================================================

/// Platform connectors available to the coordinator.
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    apis: HashMap<MusicPlatform, Arc<dyn PlatformApi>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector under the platform it reports.
    pub fn register(mut self, api: Arc<dyn PlatformApi>) -> Self {
        self.apis.insert(api.platform(), api);
        self
    }

    /// # Errors
    ///
    /// Returns [`ExportError::UnsupportedPlatform`] if nothing is registered.
    pub fn get(&self, platform: MusicPlatform) -> Result<Arc<dyn PlatformApi>> {
        self.apis
            .get(&platform)
            .cloned()
            .ok_or_else(|| ExportError::UnsupportedPlatform(platform.to_string()))
    }
}

// ============================================================================
// Produced Interface Types
// ============================================================================

/// Answer to [`ExportCoordinator::start_processing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartResult {
    /// Whether a job was claimed and scheduled.
    pub accepted: bool,
    pub job_id: Option<ExportJobId>,
}

/// Queue depth snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub pending_count: u64,
    pub processing_count: u64,
}

// ============================================================================
// Coordinator
// ============================================================================

/// Orchestrates export jobs end to end.
///
/// Cloning is cheap and every clone schedules onto the same task tracker.
#[derive(Clone)]
pub struct ExportCoordinator {
    store: Arc<dyn ExportJobStore>,
    credentials: Arc<dyn CredentialProvider>,
    tracks: Arc<dyn TrackSource>,
    cache: Arc<dyn TrackIdentityCache>,
    platforms: Arc<PlatformRegistry>,
    http: Arc<dyn HttpClient>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    config: ExportConfig,
    tasks: TaskTracker,
}

impl ExportCoordinator {
    /// # Errors
    ///
    /// Returns [`ExportError::Config`] if `config` is invalid.
    pub fn new(
        store: Arc<dyn ExportJobStore>,
        credentials: Arc<dyn CredentialProvider>,
        tracks: Arc<dyn TrackSource>,
        cache: Arc<dyn TrackIdentityCache>,
        platforms: PlatformRegistry,
        http: Arc<dyn HttpClient>,
        config: ExportConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            credentials,
            tracks,
            cache,
            platforms: Arc::new(platforms),
            http,
            events: EventBus::default(),
            clock: Arc::new(SystemClock),
            config,
            tasks: TaskTracker::new(),
        })
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn ExportJobStore> {
        &self.store
    }

    /// Persist a new pending job.
    pub async fn enqueue(&self, request: ExportRequest) -> Result<ExportJob> {
        self.platforms.get(request.platform)?;
        let job = ExportJob::new(request);
        self.store.insert(&job).await?;
        info!(job_id = %job.id, platform = %job.platform, "Export job enqueued");
        Ok(job)
    }

    /// Claim a job and run it in the background.
    ///
    /// With `None`, the oldest eligible pending job is claimed. With an id,
    /// that job is claimed if it is not terminal. Returns immediately;
    /// `accepted` is `false` when nothing could be claimed.
    pub async fn start_processing(&self, job_id: Option<&ExportJobId>) -> Result<StartResult> {
        self.start_processing_holding(job_id, ()).await
    }

    /// Like [`start_processing`](Self::start_processing), keeping `guard`
    /// alive until the spawned job finishes. Workers pass a semaphore permit.
    #[instrument(skip(self, guard))]
    pub async fn start_processing_holding<G>(
        &self,
        job_id: Option<&ExportJobId>,
        guard: G,
    ) -> Result<StartResult>
    where
        G: Send + 'static,
    {
        let Some(job) = self.store.claim(job_id).await? else {
            return Ok(StartResult {
                accepted: false,
                job_id: job_id.copied(),
            });
        };

        let id = job.id;
        let coordinator = self.clone();
        self.tasks.spawn(async move {
            coordinator.run_job(job).await;
            drop(guard);
        });

        Ok(StartResult {
            accepted: true,
            job_id: Some(id),
        })
    }

    /// Number of jobs currently running on this coordinator.
    pub fn active_jobs(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until every job started so far has finished.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    pub async fn query_health(&self) -> Result<HealthReport> {
        Ok(HealthReport {
            pending_count: self.store.count_by_status(ExportStatus::Pending).await?,
            processing_count: self.store.count_by_status(ExportStatus::Processing).await?,
        })
    }

    /// Request cancellation. The running worker stops at its next checkpoint.
    pub async fn cancel(&self, job_id: &ExportJobId) -> Result<bool> {
        let cancelled = self.store.cancel(job_id).await?;
        if cancelled {
            info!(job_id = %job_id, "Cancellation requested");
        }
        Ok(cancelled)
    }

    /// Run a claimed job to a terminal state and return that state.
    ///
    /// This is the error boundary: failures and panics in any phase end
    /// here as a `failed` job.
    #[instrument(skip(self, job), fields(job_id = %job.id, platform = %job.platform))]
    pub async fn run_job(&self, job: ExportJob) -> ExportStatus {
        let reporter = ProgressReporter::new(job.id, Arc::clone(&self.store), Arc::clone(&self.clock))
            .with_events(self.events.clone());

        let outcome = AssertUnwindSafe(self.execute_export(&job, &reporter))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ExportError::Internal(panic_message(panic.as_ref()))));

        match outcome {
            Ok(()) => ExportStatus::Completed,
            Err(ExportError::Cancelled) => {
                info!("Export stopped after cancellation");
                reporter.emit(ExportEvent::Cancelled {
                    job_id: job.id.to_string(),
                });
                ExportStatus::Cancelled
            }
            Err(e) => self.fail_job(&job.id, &e, &reporter).await,
        }
    }

    async fn fail_job(
        &self,
        job_id: &ExportJobId,
        cause: &ExportError,
        reporter: &ProgressReporter,
    ) -> ExportStatus {
        error!(error = %cause, "Export failed");

        let message = cause.to_string();
        let update = JobUpdate::failed(&message, self.clock.unix_timestamp());
        match self.store.update(job_id, &update).await {
            Ok(true) => {
                reporter.emit(ExportEvent::Failed {
                    job_id: job_id.to_string(),
                    message,
                });
                ExportStatus::Failed
            }
            Ok(false) => {
                // Already terminal, most likely cancelled meanwhile.
                let status = self
                    .store
                    .get_status(job_id)
                    .await
                    .unwrap_or(ExportStatus::Failed);
                warn!(status = %status, "Failure not recorded, job already terminal");
                status
            }
            Err(store_error) => {
                error!(error = %store_error, "Could not record failure");
                ExportStatus::Failed
            }
        }
    }

    async fn execute_export(&self, job: &ExportJob, reporter: &ProgressReporter) -> Result<()> {
        info!(job_id = %job.id, "Phase 1: fetching credentials");
        let api = self.platforms.get(job.platform)?;
        let token = self
            .credentials
            .get_valid_access_token(&job.user_id, job.platform)
            .await?;

        info!(job_id = %job.id, source = %job.source_id, "Phase 2: loading tracks");
        reporter.report(LOADING_PROGRESS, "loading tracks").await?;
        let tracks = self
            .tracks
            .list_tracks(job.source_type, &job.source_id, &job.playlist_selector)
            .await?;
        if tracks.is_empty() {
            return Err(ExportError::NoTracks);
        }

        let total = u32::try_from(tracks.len()).unwrap_or(u32::MAX);
        reporter
            .persist(
                JobUpdate::new()
                    .with_total_tracks(total)
                    .with_progress(self.config.resolve_progress_floor)
                    .with_step(format!("matching tracks (0/{})", total)),
            )
            .await?;
        reporter.emit(ExportEvent::Started {
            job_id: job.id.to_string(),
            platform: job.platform.to_string(),
            total_tracks: total,
        });

        info!(job_id = %job.id, total, "Phase 3: resolving tracks");
        let client = RateLimitedClient::new(
            Arc::clone(&self.http),
            BackoffPolicy::from_config(&self.config),
        );
        let resolver = TrackResolver::new(
            Arc::clone(&api),
            client.clone(),
            Arc::clone(&self.cache),
            self.config.clone(),
        );
        let outcome = match resolver.resolve(&tracks, &token, reporter).await? {
            Resolution::Completed(outcome) => outcome,
            Resolution::Cancelled { .. } => return Err(ExportError::Cancelled),
        };

        let refs = outcome.resolved_refs();
        if refs.is_empty() {
            return Err(ExportError::NoTracksMatched);
        }

        info!(job_id = %job.id, refs = refs.len(), "Phase 4: writing playlist");
        let details = job.playlist_details();
        let writer = writer_for(api, client, self.config.clone());
        let written = writer
            .write(
                WriteRequest {
                    refs: &refs,
                    details: &details,
                    access_token: &token,
                    resolution_failures: u32::try_from(outcome.failed_titles.len())
                        .unwrap_or(u32::MAX),
                },
                reporter,
            )
            .await?;

        info!(
            job_id = %job.id,
            added = written.added,
            failed = written.failed,
            unmatched = outcome.failed_titles.len(),
            url = %written.created.url,
            "Export completed"
        );
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{request, FakePlatform, ScriptedHttp, TestContext};
    use async_trait::async_trait;
    use bridge_traits::http::HttpResponse;
    use core_auth::{AccessToken, AuthError, UserId};
    use core_library::{
        fixtures::{seed_curated_list, SongFixture},
        PlaylistSelector, SourceType, SqliteTrackIdentityCache, SqliteTrackSource, TrackRecord,
    };

    struct StaticCredentials;

    #[async_trait]
    impl CredentialProvider for StaticCredentials {
        async fn get_valid_access_token(
            &self,
            _user_id: &UserId,
            _platform: MusicPlatform,
        ) -> core_auth::Result<AccessToken> {
            Ok(AccessToken::new("token", None))
        }
    }

    struct NoCredentials;

    #[async_trait]
    impl CredentialProvider for NoCredentials {
        async fn get_valid_access_token(
            &self,
            user_id: &UserId,
            platform: MusicPlatform,
        ) -> core_auth::Result<AccessToken> {
            Err(AuthError::NotAuthenticated {
                user_id: user_id.to_string(),
                platform: platform.to_string(),
            })
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl TrackSource for PanickingSource {
        async fn list_tracks(
            &self,
            _source_type: SourceType,
            _source_id: &str,
            _selector: &PlaylistSelector,
        ) -> core_library::Result<Vec<TrackRecord>> {
            panic!("source exploded");
        }
    }

    fn coordinator(
        ctx: &TestContext,
        credentials: Arc<dyn CredentialProvider>,
        tracks: Arc<dyn TrackSource>,
    ) -> ExportCoordinator {
        let http = Arc::new(ScriptedHttp::new(|request, _| {
            if request.url.starts_with("fake://search") {
                Ok(HttpResponse::new(200, "id"))
            } else if request.url.ends_with("/items") {
                Ok(HttpResponse::new(201, ""))
            } else {
                Ok(HttpResponse::new(201, "pl-1"))
            }
        }));
        ExportCoordinator::new(
            ctx.store.clone(),
            credentials,
            tracks,
            Arc::new(SqliteTrackIdentityCache::new(ctx.pool.clone())),
            PlatformRegistry::new().register(Arc::new(FakePlatform::bulk(100))),
            http,
            ExportConfig::default().without_pacing(),
        )
        .unwrap()
        .with_events(ctx.events.clone())
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = PlatformRegistry::new().register(Arc::new(FakePlatform::sequential()));
        assert!(registry.get(MusicPlatform::YoutubeMusic).is_ok());
        assert!(matches!(
            registry.get(MusicPlatform::Spotify),
            Err(ExportError::UnsupportedPlatform(_))
        ));
    }

    #[tokio::test]
    async fn test_start_processing_with_empty_queue() {
        let ctx = TestContext::new().await;
        let coordinator = coordinator(
            &ctx,
            Arc::new(StaticCredentials),
            Arc::new(SqliteTrackSource::new(ctx.pool.clone())),
        );

        let result = coordinator.start_processing(None).await.unwrap();
        assert_eq!(
            result,
            StartResult {
                accepted: false,
                job_id: None
            }
        );
    }

    #[tokio::test]
    async fn test_job_completes_and_health_reflects_it() {
        let ctx = TestContext::new().await;
        seed_curated_list(
            &ctx.pool,
            "list-1",
            "Road trip",
            &[SongFixture::new("One", "A"), SongFixture::new("Two", "B")],
        )
        .await
        .unwrap();
        let coordinator = coordinator(
            &ctx,
            Arc::new(StaticCredentials),
            Arc::new(SqliteTrackSource::new(ctx.pool.clone())),
        );
        let job = coordinator
            .enqueue(request(MusicPlatform::Spotify))
            .await
            .unwrap();

        let health = coordinator.query_health().await.unwrap();
        assert_eq!(health.pending_count, 1);

        let started = coordinator.start_processing(None).await.unwrap();
        assert!(started.accepted);
        assert_eq!(started.job_id, Some(job.id));
        coordinator.wait_idle().await;

        let stored = ctx.store.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Completed);
        assert_eq!(stored.total_tracks, 2);
        assert_eq!(stored.exported_tracks, 2);
        assert_eq!(stored.failed_tracks, 0);

        let health = coordinator.query_health().await.unwrap();
        assert_eq!(
            health,
            HealthReport {
                pending_count: 0,
                processing_count: 0
            }
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_job() {
        let ctx = TestContext::new().await;
        let coordinator = coordinator(
            &ctx,
            Arc::new(NoCredentials),
            Arc::new(SqliteTrackSource::new(ctx.pool.clone())),
        );
        let job = coordinator
            .enqueue(request(MusicPlatform::Spotify))
            .await
            .unwrap();
        let claimed = ctx.store.claim(Some(&job.id)).await.unwrap().unwrap();

        assert_eq!(coordinator.run_job(claimed).await, ExportStatus::Failed);

        let stored = ctx.store.find_by_id(&job.id).await.unwrap().unwrap();
        assert!(stored
            .error_message
            .unwrap()
            .contains("Could not obtain platform credentials"));
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_panic_is_caught_at_boundary() {
        let ctx = TestContext::new().await;
        let coordinator = coordinator(&ctx, Arc::new(StaticCredentials), Arc::new(PanickingSource));
        let job = coordinator
            .enqueue(request(MusicPlatform::Spotify))
            .await
            .unwrap();
        let claimed = ctx.store.claim(Some(&job.id)).await.unwrap().unwrap();

        assert_eq!(coordinator.run_job(claimed).await, ExportStatus::Failed);

        let stored = ctx.store.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(
            stored.error_message.as_deref(),
            Some("Unexpected failure: source exploded")
        );
    }

    #[tokio::test]
    async fn test_new_rejects_zero_checkpoint_intervals() {
        let ctx = TestContext::new().await;
        let mut config = ExportConfig::default();
        config.progress_interval = 0;

        let result = ExportCoordinator::new(
            ctx.store.clone(),
            Arc::new(StaticCredentials),
            Arc::new(SqliteTrackSource::new(ctx.pool.clone())),
            Arc::new(SqliteTrackIdentityCache::new(ctx.pool.clone())),
            PlatformRegistry::new().register(Arc::new(FakePlatform::bulk(100))),
            Arc::new(ScriptedHttp::new(|_, _| Ok(HttpResponse::new(200, "")))),
            config,
        );
        assert!(matches!(result, Err(ExportError::Config(_))));

        let result = ExportCoordinator::new(
            ctx.store.clone(),
            Arc::new(StaticCredentials),
            Arc::new(SqliteTrackSource::new(ctx.pool.clone())),
            Arc::new(SqliteTrackIdentityCache::new(ctx.pool.clone())),
            PlatformRegistry::new(),
            Arc::new(ScriptedHttp::new(|_, _| Ok(HttpResponse::new(200, "")))),
            ExportConfig::default().with_cancel_check_interval(0),
        );
        assert!(matches!(result, Err(ExportError::Config(_))));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_unregistered_platform() {
        let ctx = TestContext::new().await;
        let coordinator = coordinator(
            &ctx,
            Arc::new(StaticCredentials),
            Arc::new(SqliteTrackSource::new(ctx.pool.clone())),
        );

        let result = coordinator.enqueue(request(MusicPlatform::YoutubeMusic)).await;
        assert!(matches!(result, Err(ExportError::UnsupportedPlatform(_))));
    }

    #[tokio::test]
    async fn test_targeted_start_of_terminal_job_is_rejected() {
        let ctx = TestContext::new().await;
        let coordinator = coordinator(
            &ctx,
            Arc::new(StaticCredentials),
            Arc::new(SqliteTrackSource::new(ctx.pool.clone())),
        );
        let job = coordinator
            .enqueue(request(MusicPlatform::Spotify))
            .await
            .unwrap();
        assert!(coordinator.cancel(&job.id).await.unwrap());

        let result = coordinator.start_processing(Some(&job.id)).await.unwrap();
        assert!(!result.accepted);
        assert_eq!(result.job_id, Some(job.id));
    }
}
