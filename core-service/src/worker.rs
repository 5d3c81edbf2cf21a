//! Polling worker loop.
//!
//! The worker claims pending jobs while it has free slots and sleeps for
//! `worker_poll_interval` whenever the queue is empty. Slots are semaphore
//! permits held by each running job. Shutdown stops new claims and then
//! waits for running jobs; cancelling an individual job stays store-driven.

use std::sync::Arc;

use core_runtime::events::{CoreEvent, WorkerEvent};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ExportService, Result, ServiceError};

impl ExportService {
    /// Run the claim loop until `shutdown` fires.
    pub async fn run_worker(&self, shutdown: CancellationToken) -> Result<()> {
        let max_concurrent_jobs = self.config().max_concurrent_jobs;
        let poll_interval = self.config().worker_poll_interval;
        let slots = Arc::new(Semaphore::new(max_concurrent_jobs));
        let mut jobs_started = 0u64;

        info!(
            max_concurrent_jobs,
            poll_interval_ms = poll_interval.as_millis() as u64,
            "Export worker started"
        );
        self.events().publish(CoreEvent::Worker(WorkerEvent::Started {
            max_concurrent_jobs,
        }));

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = slots.clone().acquire_owned() => {
                    permit.map_err(|e| ServiceError::Worker(e.to_string()))?
                }
            };

            match self.coordinator().start_processing_holding(None, permit).await {
                Ok(started) if started.accepted => {
                    jobs_started += 1;
                    debug!(job_id = ?started.job_id, "Claimed export job");
                    continue;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to claim export job"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!(
            running = self.coordinator().active_jobs(),
            "Shutdown requested, waiting for running jobs"
        );
        self.coordinator().wait_idle().await;

        info!(jobs_started, "Export worker stopped");
        self.events()
            .publish(CoreEvent::Worker(WorkerEvent::Stopped { jobs_started }));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
    use bridge_traits::platform::MusicPlatform;
    use core_auth::{AccessToken, SqliteCredentialProvider, UserId};
    use core_export::{ExportConfig, ExportRequest, ExportStatus};
    use core_library::db::create_test_pool;
    use core_library::fixtures::{seed_curated_list, SongFixture};
    use core_library::{PlaylistSelector, SourceType};
    use core_runtime::config::CoreConfig;
    use mockall::mock;
    use std::time::Duration;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn config() -> CoreConfig {
        CoreConfig::builder()
            .database_path("unused.db")
            .worker_poll_interval(Duration::from_millis(10))
            .max_concurrent_jobs(2)
            .build()
            .unwrap()
    }

    async fn service(http: MockHttpClient) -> ExportService {
        let pool = create_test_pool().await.unwrap();
        ExportService::with_components(
            config(),
            pool,
            Arc::new(http),
            ExportConfig::default().without_pacing(),
        )
        .unwrap()
    }

    fn request(user_id: UserId) -> ExportRequest {
        ExportRequest {
            user_id,
            platform: MusicPlatform::Spotify,
            source_type: SourceType::CuratedList,
            source_id: "list-1".to_string(),
            playlist_selector: PlaylistSelector::All,
            playlist_name: "Worker test".to_string(),
            description: None,
            is_public: false,
            is_collaborative: false,
        }
    }

    /// Serves Spotify search, create and add endpoints.
    fn spotify_http() -> MockHttpClient {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|req| {
            let response = if req.url.contains("/search?") {
                HttpResponse::new(200, r#"{"tracks": {"items": [{"id": "trk1"}]}}"#)
            } else if req.url.ends_with("/me/playlists") {
                HttpResponse::new(
                    201,
                    r#"{"id": "pl1", "external_urls": {"spotify": "https://open.spotify.com/playlist/pl1"}}"#,
                )
            } else {
                HttpResponse::new(201, r#"{"snapshot_id": "s1"}"#)
            };
            Ok(response)
        });
        http
    }

    async fn wait_for_terminal(service: &ExportService, job_id: &core_export::ExportJobId) -> ExportStatus {
        for _ in 0..500 {
            let status = service
                .coordinator()
                .store()
                .get_status(job_id)
                .await
                .unwrap();
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown_with_empty_queue() {
        let service = service(MockHttpClient::new()).await;
        let mut events = service.events().subscribe();
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn({
            let service = service.clone();
            let shutdown = shutdown.clone();
            async move { service.run_worker(shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();
        worker.await.unwrap().unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Worker(WorkerEvent::Started { max_concurrent_jobs: 2 })
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Worker(WorkerEvent::Stopped { jobs_started: 0 })
        ));
    }

    #[tokio::test]
    async fn test_worker_claims_and_completes_pending_job() {
        let service = service(spotify_http()).await;
        let user_id = UserId::new();

        SqliteCredentialProvider::new(service.pool().clone())
            .store_token(&user_id, MusicPlatform::Spotify, &AccessToken::new("tok", None))
            .await
            .unwrap();
        seed_curated_list(
            service.pool(),
            "list-1",
            "Favourites",
            &[SongFixture::new("Song A", "Artist"), SongFixture::new("Song B", "Artist")],
        )
        .await
        .unwrap();

        let job = service.enqueue(request(user_id)).await.unwrap();
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn({
            let service = service.clone();
            let shutdown = shutdown.clone();
            async move { service.run_worker(shutdown).await }
        });

        let status = wait_for_terminal(&service, &job.id).await;
        shutdown.cancel();
        worker.await.unwrap().unwrap();

        assert_eq!(status, ExportStatus::Completed);
        let job = service
            .coordinator()
            .store()
            .find_by_id(&job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.exported_tracks, 2);
        assert_eq!(job.external_playlist_id.as_deref(), Some("pl1"));

        let health = service.query_health().await.unwrap();
        assert_eq!(health.pending_count, 0);
        assert_eq!(health.processing_count, 0);
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_the_job() {
        let service = service(MockHttpClient::new()).await;
        seed_curated_list(service.pool(), "list-1", "Favourites", &[SongFixture::new("A", "B")])
            .await
            .unwrap();

        let job = service.enqueue(request(UserId::new())).await.unwrap();
        assert!(service.start_processing(Some(&job.id)).await.unwrap().accepted);
        service.coordinator().wait_idle().await;

        let job = service
            .coordinator()
            .store()
            .find_by_id(&job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, ExportStatus::Failed);
        assert!(job
            .error_message
            .unwrap()
            .contains("Could not obtain platform credentials"));
    }
}
