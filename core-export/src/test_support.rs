//! Shared fixtures for unit tests.

use crate::{
    ExportJob, ExportJobId, ExportJobStore, ExportRequest, ProgressReporter, SqliteExportJobStore,
};
use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse},
    platform::{CreatedPlaylist, MusicPlatform, PlatformApi, PlatformRef, PlaylistDetails},
    time::{Clock, SystemClock},
};
use core_auth::UserId;
use core_library::{db::create_test_pool, PlaylistSelector, SourceType};
use core_runtime::events::EventBus;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};

pub struct TestContext {
    pub pool: SqlitePool,
    pub store: Arc<SqliteExportJobStore>,
    pub events: EventBus,
    pub clock: Arc<dyn Clock>,
}

impl TestContext {
    pub async fn new() -> Self {
        let pool = create_test_pool().await.unwrap();
        Self {
            store: Arc::new(SqliteExportJobStore::new(pool.clone())),
            pool,
            events: EventBus::new(64),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn reporter(&self, job_id: &ExportJobId) -> ProgressReporter {
        ProgressReporter::new(*job_id, self.store.clone(), self.clock.clone())
            .with_events(self.events.clone())
    }
}

pub fn request(platform: MusicPlatform) -> ExportRequest {
    ExportRequest {
        user_id: UserId::new(),
        platform,
        source_type: SourceType::CuratedList,
        source_id: "list-1".to_string(),
        playlist_selector: PlaylistSelector::All,
        playlist_name: "Road trip".to_string(),
        description: Some("From the community list".to_string()),
        is_public: true,
        is_collaborative: false,
    }
}

/// Insert a Spotify job and claim it.
pub async fn processing_job(ctx: &TestContext) -> ExportJob {
    let job = ExportJob::new(request(MusicPlatform::Spotify));
    ctx.store.insert(&job).await.unwrap();
    ctx.store.claim(Some(&job.id)).await.unwrap().unwrap()
}

/// Platform codec with predictable URLs.
///
/// Search responses carry the matched id as the plain-text body; an empty
/// body means no match. Created playlists carry their id the same way.
pub struct FakePlatform {
    pub platform: MusicPlatform,
    pub max_items: usize,
}

impl FakePlatform {
    pub fn bulk(max_items: usize) -> Self {
        Self {
            platform: MusicPlatform::Spotify,
            max_items,
        }
    }

    pub fn sequential() -> Self {
        Self {
            platform: MusicPlatform::YoutubeMusic,
            max_items: 1,
        }
    }
}

impl PlatformApi for FakePlatform {
    fn platform(&self) -> MusicPlatform {
        self.platform
    }

    fn max_items_per_add(&self) -> usize {
        self.max_items
    }

    fn search_request(&self, _token: &str, title: &str, artist: &str) -> BridgeResult<HttpRequest> {
        Ok(HttpRequest::new(
            HttpMethod::Get,
            format!("fake://search/{}/{}", artist, title),
        ))
    }

    fn parse_search(&self, response: &HttpResponse) -> BridgeResult<Option<String>> {
        let body = response.text()?;
        Ok(Some(body.trim().to_string()).filter(|id| !id.is_empty()))
    }

    fn track_ref(&self, external_id: &str) -> Option<PlatformRef> {
        let id = external_id.trim();
        (!id.is_empty()).then(|| PlatformRef::new(format!("fake:track:{}", id)))
    }

    fn create_playlist_request(
        &self,
        _token: &str,
        details: &PlaylistDetails,
    ) -> BridgeResult<HttpRequest> {
        Ok(HttpRequest::new(
            HttpMethod::Post,
            format!("fake://playlists/{}", details.name),
        ))
    }

    fn parse_created_playlist(&self, response: &HttpResponse) -> BridgeResult<CreatedPlaylist> {
        let id = response.text()?;
        if id.is_empty() {
            return Err(BridgeError::OperationFailed("missing playlist id".into()));
        }
        Ok(CreatedPlaylist {
            url: format!("https://fake.test/playlist/{}", id),
            id,
        })
    }

    fn add_items_request(
        &self,
        _token: &str,
        playlist_id: &str,
        refs: &[PlatformRef],
    ) -> BridgeResult<HttpRequest> {
        let body = refs
            .iter()
            .map(PlatformRef::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let mut request = HttpRequest::new(
            HttpMethod::Post,
            format!("fake://playlists/{}/items", playlist_id),
        );
        request.body = Some(body.into());
        Ok(request)
    }
}

type Responder = Box<dyn Fn(&HttpRequest, usize) -> BridgeResult<HttpResponse> + Send + Sync>;

/// HTTP client answering from a closure and recording every request.
///
/// The closure receives the request and the zero-based index of the call.
pub struct ScriptedHttp {
    responder: Responder,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest, usize) -> BridgeResult<HttpResponse> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests whose URL starts with `prefix`.
    pub fn calls(&self, prefix: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        (self.responder)(&request, index)
    }
}

pub fn body_text(request: &HttpRequest) -> String {
    request
        .body
        .as_ref()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default()
}
