//! End-to-end tests for the export pipeline
//!
//! These tests run real jobs through the coordinator against an in-memory
//! SQLite database (job store, track source and identity cache) and a fake
//! platform that counts every outbound call:
//! - empty sources and unmatched tracks fail the job
//! - cache hits and native tracks skip platform search
//! - cancellation halts the job before the playlist is created
//! - rate-limit exhaustion is fatal
//! - both writer variants complete with consistent counts

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse},
    platform::{CreatedPlaylist, MusicPlatform, PlatformApi, PlatformRef, PlaylistDetails},
};
use core_auth::{AccessToken, CredentialProvider, UserId};
use core_export::{
    ExportConfig, ExportCoordinator, ExportJob, ExportJobId, ExportJobStore, ExportRequest,
    ExportStatus, PlatformRegistry, SqliteExportJobStore,
};
use core_library::{
    db::create_test_pool,
    fixtures::{seed_curated_list, seed_group_playlist, SongFixture},
    CacheEntry, PlaylistSelector, SourceType, SqliteTrackIdentityCache, SqliteTrackSource,
    TrackIdentityCache,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Fake Platform
// ============================================================================

/// Codec with plain-text bodies: a search body is the matched id (empty for
/// no match) and a create body is the playlist id.
struct FakeApi {
    platform: MusicPlatform,
    max_items: usize,
}

impl FakeApi {
    fn spotify() -> Self {
        Self {
            platform: MusicPlatform::Spotify,
            max_items: 100,
        }
    }

    fn youtube() -> Self {
        Self {
            platform: MusicPlatform::YoutubeMusic,
            max_items: 1,
        }
    }
}

impl PlatformApi for FakeApi {
    fn platform(&self) -> MusicPlatform {
        self.platform
    }

    fn max_items_per_add(&self) -> usize {
        self.max_items
    }

    fn search_request(&self, token: &str, title: &str, _artist: &str) -> BridgeResult<HttpRequest> {
        Ok(HttpRequest::new(HttpMethod::Get, format!("search:{}", title)).bearer_token(token))
    }

    fn parse_search(&self, response: &HttpResponse) -> BridgeResult<Option<String>> {
        let id = response.text()?;
        Ok(Some(id).filter(|id| !id.is_empty()))
    }

    fn track_ref(&self, external_id: &str) -> Option<PlatformRef> {
        match self.platform {
            MusicPlatform::Spotify => Some(PlatformRef::new(format!("spotify:track:{}", external_id))),
            MusicPlatform::YoutubeMusic => Some(PlatformRef::new(external_id)),
        }
    }

    fn create_playlist_request(
        &self,
        token: &str,
        details: &PlaylistDetails,
    ) -> BridgeResult<HttpRequest> {
        Ok(HttpRequest::new(HttpMethod::Post, format!("create:{}", details.name)).bearer_token(token))
    }

    fn parse_created_playlist(&self, response: &HttpResponse) -> BridgeResult<CreatedPlaylist> {
        let id = response.text()?;
        Ok(CreatedPlaylist {
            url: format!("https://platform.test/playlist/{}", id),
            id,
        })
    }

    fn add_items_request(
        &self,
        token: &str,
        playlist_id: &str,
        refs: &[PlatformRef],
    ) -> BridgeResult<HttpRequest> {
        let mut request =
            HttpRequest::new(HttpMethod::Post, format!("add:{}", playlist_id)).bearer_token(token);
        let body = refs
            .iter()
            .map(PlatformRef::as_str)
            .collect::<Vec<_>>()
            .join(",");
        request.body = Some(body.into());
        Ok(request)
    }
}

type SearchFn = Box<dyn Fn(&str) -> HttpResponse + Send + Sync>;
type AddFn = Box<dyn Fn(&str) -> HttpResponse + Send + Sync>;

/// Counts calls per endpoint and can cancel a job after the n-th search.
struct FakeHttp {
    search: SearchFn,
    add: AddFn,
    searches: AtomicUsize,
    creates: AtomicUsize,
    adds: Mutex<Vec<String>>,
    cancel_after: Mutex<Option<(usize, ExportJobId)>>,
    store: Arc<SqliteExportJobStore>,
}

impl FakeHttp {
    fn new(store: Arc<SqliteExportJobStore>) -> Self {
        Self {
            search: Box::new(|title| HttpResponse::new(200, format!("id-{}", title))),
            add: Box::new(|_| HttpResponse::new(201, "")),
            searches: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            adds: Mutex::new(Vec::new()),
            cancel_after: Mutex::new(None),
            store,
        }
    }

    fn with_search<F>(mut self, search: F) -> Self
    where
        F: Fn(&str) -> HttpResponse + Send + Sync + 'static,
    {
        self.search = Box::new(search);
        self
    }

    fn with_add<F>(mut self, add: F) -> Self
    where
        F: Fn(&str) -> HttpResponse + Send + Sync + 'static,
    {
        self.add = Box::new(add);
        self
    }

    fn cancel_after_searches(&self, count: usize, job_id: ExportJobId) {
        *self.cancel_after.lock().unwrap() = Some((count, job_id));
    }

    fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    fn adds(&self) -> Vec<String> {
        self.adds.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        assert_eq!(request.headers.get("Authorization").map(String::as_str), Some("Bearer token"));

        if let Some(title) = request.url.strip_prefix("search:") {
            let count = self.searches.fetch_add(1, Ordering::SeqCst) + 1;
            let hook = *self.cancel_after.lock().unwrap();
            if let Some((after, job_id)) = hook {
                if count == after {
                    self.store.cancel(&job_id).await.unwrap();
                }
            }
            return Ok((self.search)(title));
        }

        if let Some(name) = request.url.strip_prefix("create:") {
            self.creates.fetch_add(1, Ordering::SeqCst);
            return Ok(HttpResponse::new(201, format!("pl-{}", name.len())));
        }

        if request.url.starts_with("add:") {
            let body = request
                .body
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            self.adds.lock().unwrap().push(body.clone());
            return Ok((self.add)(&body));
        }

        Err(BridgeError::OperationFailed(format!("unexpected url {}", request.url)))
    }
}

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

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    pool: sqlx::SqlitePool,
    store: Arc<SqliteExportJobStore>,
    cache: Arc<SqliteTrackIdentityCache>,
}

impl Harness {
    async fn new() -> Self {
        let pool = create_test_pool().await.unwrap();
        Self {
            store: Arc::new(SqliteExportJobStore::new(pool.clone())),
            cache: Arc::new(SqliteTrackIdentityCache::new(pool.clone())),
            pool,
        }
    }

    fn http(&self) -> FakeHttp {
        FakeHttp::new(self.store.clone())
    }

    fn coordinator(&self, http: Arc<FakeHttp>, config: ExportConfig) -> ExportCoordinator {
        ExportCoordinator::new(
            self.store.clone(),
            Arc::new(StaticCredentials),
            Arc::new(SqliteTrackSource::new(self.pool.clone())),
            self.cache.clone(),
            PlatformRegistry::new()
                .register(Arc::new(FakeApi::spotify()))
                .register(Arc::new(FakeApi::youtube())),
            http,
            config,
        )
        .unwrap()
    }

    /// Enqueue, run to completion and return the final record.
    async fn run(&self, coordinator: &ExportCoordinator, job: &ExportJob) -> ExportJob {
        let started = coordinator.start_processing(Some(&job.id)).await.unwrap();
        assert!(started.accepted);
        coordinator.wait_idle().await;
        self.store.find_by_id(&job.id).await.unwrap().unwrap()
    }
}

fn fast_config() -> ExportConfig {
    ExportConfig::default()
        .without_pacing()
        .with_base_backoff(Duration::from_millis(1))
}

fn request(platform: MusicPlatform, source_type: SourceType, source_id: &str) -> ExportRequest {
    ExportRequest {
        user_id: UserId::new(),
        platform,
        source_type,
        source_id: source_id.to_string(),
        playlist_selector: PlaylistSelector::All,
        playlist_name: "Weekly picks".to_string(),
        description: Some("Exported".to_string()),
        is_public: true,
        is_collaborative: false,
    }
}

fn assert_counts_add_up(job: &ExportJob) {
    assert_eq!(job.status, ExportStatus::Completed);
    assert_eq!(job.exported_tracks + job.failed_tracks, job.total_tracks);
    assert_eq!(job.progress, 100);
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_empty_source_fails_with_no_tracks() {
    let h = Harness::new().await;
    seed_curated_list(&h.pool, "list-1", "Empty", &[SongFixture::new("Draft", "A").pending()])
        .await
        .unwrap();
    let http = Arc::new(h.http());
    let coordinator = h.coordinator(http.clone(), fast_config());

    let job = coordinator
        .enqueue(request(MusicPlatform::Spotify, SourceType::CuratedList, "list-1"))
        .await
        .unwrap();
    let job = h.run(&coordinator, &job).await;

    assert_eq!(job.status, ExportStatus::Failed);
    assert!(job.error_message.unwrap().contains("No tracks"));
    assert!(job.completed_at.is_some());
    assert_eq!(http.searches() + http.creates(), 0);
}

#[tokio::test]
async fn test_three_misses_on_bulk_platform() {
    let h = Harness::new().await;
    seed_curated_list(
        &h.pool,
        "list-1",
        "Three",
        &[
            SongFixture::new("One", "A"),
            SongFixture::new("Two", "B"),
            SongFixture::new("Three", "C"),
        ],
    )
    .await
    .unwrap();
    let http = Arc::new(h.http());
    let coordinator = h.coordinator(http.clone(), fast_config());

    let job = coordinator
        .enqueue(request(MusicPlatform::Spotify, SourceType::CuratedList, "list-1"))
        .await
        .unwrap();
    let job = h.run(&coordinator, &job).await;

    assert_eq!(http.searches(), 3);
    assert_eq!(http.creates(), 1);
    assert_eq!(
        http.adds(),
        vec!["spotify:track:id-One,spotify:track:id-Two,spotify:track:id-Three".to_string()]
    );
    assert_counts_add_up(&job);
    assert_eq!(job.exported_tracks, 3);
    assert_eq!(job.failed_tracks, 0);
    assert!(job.external_playlist_url.is_some());
}

#[tokio::test]
async fn test_cancellation_halts_before_playlist_creation() {
    let h = Harness::new().await;
    let titles: Vec<String> = (0..50).map(|i| format!("Song {}", i)).collect();
    let songs: Vec<SongFixture<'_>> = titles.iter().map(|t| SongFixture::new(t, "Band")).collect();
    seed_curated_list(&h.pool, "list-1", "Fifty", &songs).await.unwrap();

    let http = Arc::new(h.http());
    let coordinator = h.coordinator(http.clone(), fast_config());
    let job = coordinator
        .enqueue(request(MusicPlatform::Spotify, SourceType::CuratedList, "list-1"))
        .await
        .unwrap();
    http.cancel_after_searches(20, job.id);

    let job = h.run(&coordinator, &job).await;

    assert_eq!(job.status, ExportStatus::Cancelled);
    assert_eq!(http.searches(), 20);
    assert_eq!(http.creates(), 0);
    assert!(http.adds().is_empty());
    assert!(job.external_playlist_id.is_none());
}

#[tokio::test]
async fn test_native_track_needs_no_lookup() {
    let h = Harness::new().await;
    seed_curated_list(
        &h.pool,
        "list-1",
        "Native",
        &[SongFixture::new("Song", "Artist").native("spotify", "abc123")],
    )
    .await
    .unwrap();
    let http = Arc::new(h.http());
    let coordinator = h.coordinator(http.clone(), fast_config());

    let job = coordinator
        .enqueue(request(MusicPlatform::Spotify, SourceType::CuratedList, "list-1"))
        .await
        .unwrap();
    let job = h.run(&coordinator, &job).await;

    assert_eq!(http.searches(), 0);
    assert_eq!(http.adds(), vec!["spotify:track:abc123".to_string()]);
    assert_counts_add_up(&job);
}

#[tokio::test]
async fn test_only_cache_misses_are_searched() {
    let h = Harness::new().await;
    seed_curated_list(
        &h.pool,
        "list-1",
        "Mixed",
        &[
            SongFixture::new("Cached A", "X"),
            SongFixture::new("Fresh 1", "X"),
            SongFixture::new("Cached B", "X"),
            SongFixture::new("Fresh 2", "X"),
            SongFixture::new("Fresh 3", "X"),
        ],
    )
    .await
    .unwrap();
    h.cache
        .write_back(
            &[
                CacheEntry::new("Cached A", "X", "ca"),
                CacheEntry::new("Cached B", "X", "cb"),
            ],
            MusicPlatform::Spotify,
        )
        .await
        .unwrap();

    let http = Arc::new(h.http());
    let coordinator = h.coordinator(http.clone(), fast_config());
    let job = coordinator
        .enqueue(request(MusicPlatform::Spotify, SourceType::CuratedList, "list-1"))
        .await
        .unwrap();
    let job = h.run(&coordinator, &job).await;

    assert_eq!(http.searches(), 3);
    assert_eq!(
        http.adds(),
        vec![[
            "spotify:track:ca",
            "spotify:track:id-Fresh 1",
            "spotify:track:cb",
            "spotify:track:id-Fresh 2",
            "spotify:track:id-Fresh 3",
        ]
        .join(",")]
    );
    assert_counts_add_up(&job);
}

#[tokio::test]
async fn test_unmatched_tracks_are_partial_failures() {
    let h = Harness::new().await;
    seed_curated_list(
        &h.pool,
        "list-1",
        "Partial",
        &[SongFixture::new("Known", "A"), SongFixture::new("Obscure", "B")],
    )
    .await
    .unwrap();
    let http = Arc::new(h.http().with_search(|title| {
        if title == "Obscure" {
            HttpResponse::new(200, "")
        } else {
            HttpResponse::new(200, format!("id-{}", title))
        }
    }));
    let coordinator = h.coordinator(http.clone(), fast_config());

    let job = coordinator
        .enqueue(request(MusicPlatform::Spotify, SourceType::CuratedList, "list-1"))
        .await
        .unwrap();
    let job = h.run(&coordinator, &job).await;

    assert_counts_add_up(&job);
    assert_eq!(job.exported_tracks, 1);
    assert_eq!(job.failed_tracks, 1);
}

#[tokio::test]
async fn test_no_matches_fails_job() {
    let h = Harness::new().await;
    seed_curated_list(&h.pool, "list-1", "Unknown", &[SongFixture::new("Nothing", "Nobody")])
        .await
        .unwrap();
    let http = Arc::new(h.http().with_search(|_| HttpResponse::new(200, "")));
    let coordinator = h.coordinator(http.clone(), fast_config());

    let job = coordinator
        .enqueue(request(MusicPlatform::Spotify, SourceType::CuratedList, "list-1"))
        .await
        .unwrap();
    let job = h.run(&coordinator, &job).await;

    assert_eq!(job.status, ExportStatus::Failed);
    assert!(job.error_message.unwrap().contains("No tracks could be matched"));
    assert_eq!(http.creates(), 0);
}

#[tokio::test]
async fn test_rate_limit_exhaustion_fails_job() {
    let h = Harness::new().await;
    seed_curated_list(&h.pool, "list-1", "Limited", &[SongFixture::new("One", "A")])
        .await
        .unwrap();
    let http = Arc::new(h.http().with_search(|_| HttpResponse::new(429, "")));
    let coordinator = h.coordinator(http.clone(), fast_config().with_max_retries(2));

    let job = coordinator
        .enqueue(request(MusicPlatform::Spotify, SourceType::CuratedList, "list-1"))
        .await
        .unwrap();
    let job = h.run(&coordinator, &job).await;

    assert_eq!(http.searches(), 3);
    assert_eq!(job.status, ExportStatus::Failed);
    assert_eq!(job.retry_count, 2);
    assert!(job.next_retry_at.is_some());
    assert!(job.last_error.is_some());
    assert!(job
        .error_message
        .unwrap()
        .contains("Rate limit retries exhausted"));
}

#[tokio::test]
async fn test_sequential_platform_with_group_playlists() {
    let h = Harness::new().await;
    seed_group_playlist(
        &h.pool,
        "group-1",
        "second",
        Some(2),
        10,
        &[SongFixture::new("C", "x"), SongFixture::new("D", "x")],
    )
    .await
    .unwrap();
    seed_group_playlist(
        &h.pool,
        "group-1",
        "first",
        Some(1),
        20,
        &[SongFixture::new("A", "x"), SongFixture::new("B", "x").native("youtube", "vid-b")],
    )
    .await
    .unwrap();

    // "id-C" always conflicts: one retry, then a recorded failure.
    let http = Arc::new(h.http().with_add(|body| {
        if body == "id-C" {
            HttpResponse::new(409, "conflict")
        } else {
            HttpResponse::new(200, "")
        }
    }));
    let coordinator = h.coordinator(http.clone(), fast_config());

    let job = coordinator
        .enqueue(request(
            MusicPlatform::YoutubeMusic,
            SourceType::GroupPlaylist,
            "group-1",
        ))
        .await
        .unwrap();
    let job = h.run(&coordinator, &job).await;

    assert_eq!(http.searches(), 3);
    assert_eq!(
        http.adds(),
        vec!["id-A", "vid-b", "id-C", "id-C", "id-D"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
    );
    assert_counts_add_up(&job);
    assert_eq!(job.total_tracks, 4);
    assert_eq!(job.exported_tracks, 3);
    assert_eq!(job.failed_tracks, 1);
}

#[tokio::test]
async fn test_terminal_job_is_never_reclaimed() {
    let h = Harness::new().await;
    seed_curated_list(&h.pool, "list-1", "Once", &[SongFixture::new("One", "A")])
        .await
        .unwrap();
    let http = Arc::new(h.http());
    let coordinator = h.coordinator(http.clone(), fast_config());

    let job = coordinator
        .enqueue(request(MusicPlatform::Spotify, SourceType::CuratedList, "list-1"))
        .await
        .unwrap();
    let finished = h.run(&coordinator, &job).await;
    assert_eq!(finished.status, ExportStatus::Completed);

    let again = coordinator.start_processing(Some(&job.id)).await.unwrap();
    assert!(!again.accepted);
    assert!(coordinator.cancel(&job.id).await.is_ok_and(|cancelled| !cancelled));
    assert_eq!(
        h.store.get_status(&job.id).await.unwrap(),
        ExportStatus::Completed
    );
    assert_eq!(http.creates(), 1);
}
