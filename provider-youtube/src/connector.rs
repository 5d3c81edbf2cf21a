//! YouTube Data API connector implementation
//!
//! Implements the `PlatformApi` codec for YouTube. Playlists are created
//! through the Data API and linked to their YouTube Music page.

use bridge_traits::error::Result;
use bridge_traits::http::{HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::platform::{
    CreatedPlaylist, MusicPlatform, PlatformApi, PlatformRef, PlaylistDetails,
};
use tracing::debug;

use crate::error::YouTubeError;
use crate::types::{
    CreatedPlaylistResource, ErrorResponse, PlaylistItemResource, PlaylistItemSnippet,
    PlaylistResource, PlaylistSnippet, PlaylistStatus, PrivacyStatus, ResourceId,
    SearchListResponse, VIDEO_KIND,
};

/// YouTube Data API base URL
const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Where created playlists are opened
const PLAYLIST_URL_BASE: &str = "https://music.youtube.com/playlist?list=";

/// `playlistItems.insert` takes exactly one video
pub const MAX_ITEMS_PER_REQUEST: usize = 1;

/// YouTube API connector
#[derive(Debug, Clone)]
pub struct YouTubeApi {
    base_url: String,
}

impl Default for YouTubeApi {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeApi {
    pub fn new() -> Self {
        Self {
            base_url: YOUTUBE_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Extract a video id from a bare id or a watch / youtu.be URL.
    pub fn normalize_video_id(value: &str) -> Option<&str> {
        let value = value.trim();

        let id = if let Some((_, query)) = value.split_once("watch?") {
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix("v="))?
        } else if let Some((_, rest)) = value.split_once("youtu.be/") {
            rest.split(|c: char| c == '?' || c == '/' || c == '#')
                .next()
                .unwrap_or_default()
        } else {
            value
        };

        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then_some(id)
    }

    fn check_status(response: &HttpResponse) -> std::result::Result<(), YouTubeError> {
        if response.is_success() {
            return Ok(());
        }

        let (reason, message) = match response.json::<ErrorResponse>() {
            Ok(envelope) => (
                envelope
                    .error
                    .errors
                    .into_iter()
                    .next()
                    .map(|detail| detail.reason)
                    .unwrap_or_default(),
                envelope.error.message,
            ),
            Err(_) => (String::new(), response.text().unwrap_or_default()),
        };

        Err(YouTubeError::ApiError {
            status_code: response.status,
            reason,
            message,
        })
    }
}

impl PlatformApi for YouTubeApi {
    fn platform(&self) -> MusicPlatform {
        MusicPlatform::YoutubeMusic
    }

    fn max_items_per_add(&self) -> usize {
        MAX_ITEMS_PER_REQUEST
    }

    fn search_request(&self, access_token: &str, title: &str, artist: &str) -> Result<HttpRequest> {
        let query = format!("{} {}", artist.trim(), title.trim());
        let url = format!(
            "{}/search?part=snippet&type=video&maxResults=1&q={}",
            self.base_url,
            urlencoding::encode(query.trim())
        );

        Ok(HttpRequest::new(HttpMethod::Get, url)
            .bearer_token(access_token)
            .header("Accept", "application/json"))
    }

    fn parse_search(&self, response: &HttpResponse) -> Result<Option<String>> {
        Self::check_status(response)?;

        let search: SearchListResponse = response
            .json()
            .map_err(|e| YouTubeError::ParseError(e.to_string()))?;

        let found = search
            .items
            .into_iter()
            .filter(|item| item.id.kind == VIDEO_KIND)
            .find_map(|item| item.id.video_id);

        debug!(found = found.is_some(), "Parsed YouTube search response");
        Ok(found)
    }

    fn track_ref(&self, external_id: &str) -> Option<PlatformRef> {
        Self::normalize_video_id(external_id).map(PlatformRef::new)
    }

    fn create_playlist_request(
        &self,
        access_token: &str,
        details: &PlaylistDetails,
    ) -> Result<HttpRequest> {
        let privacy_status = if details.is_public {
            PrivacyStatus::Public
        } else {
            PrivacyStatus::Private
        };
        let body = PlaylistResource {
            snippet: PlaylistSnippet {
                title: &details.name,
                description: details.description.as_deref(),
            },
            status: PlaylistStatus { privacy_status },
        };

        HttpRequest::new(
            HttpMethod::Post,
            format!("{}/playlists?part=snippet,status", self.base_url),
        )
        .bearer_token(access_token)
        .json(&body)
    }

    fn parse_created_playlist(&self, response: &HttpResponse) -> Result<CreatedPlaylist> {
        Self::check_status(response)?;

        let playlist: CreatedPlaylistResource = response
            .json()
            .map_err(|e| YouTubeError::ParseError(e.to_string()))?;

        Ok(CreatedPlaylist {
            url: format!("{}{}", PLAYLIST_URL_BASE, playlist.id),
            id: playlist.id,
        })
    }

    fn add_items_request(
        &self,
        access_token: &str,
        playlist_id: &str,
        refs: &[PlatformRef],
    ) -> Result<HttpRequest> {
        let video = match refs {
            [single] => single,
            _ => {
                return Err(YouTubeError::InvalidRequest(format!(
                    "playlistItems.insert takes one video, got {}",
                    refs.len()
                ))
                .into())
            }
        };

        let body = PlaylistItemResource {
            snippet: PlaylistItemSnippet {
                playlist_id,
                resource_id: ResourceId {
                    kind: VIDEO_KIND.to_string(),
                    video_id: Some(video.as_str().to_string()),
                },
            },
        };

        HttpRequest::new(
            HttpMethod::Post,
            format!("{}/playlistItems?part=snippet", self.base_url),
        )
        .bearer_token(access_token)
        .json(&body)
    }
}
