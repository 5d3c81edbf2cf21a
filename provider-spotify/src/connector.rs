//! Spotify Web API connector implementation
//!
//! Implements the `PlatformApi` codec for Spotify. Spotify accepts up to 100
//! track URIs per add request, so exports to it run through the bulk writer.

use bridge_traits::error::Result;
use bridge_traits::http::{HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::platform::{
    CreatedPlaylist, MusicPlatform, PlatformApi, PlatformRef, PlaylistDetails,
};
use tracing::debug;

use crate::error::SpotifyError;
use crate::types::{AddTracksBody, CreatePlaylistBody, ErrorResponse, Playlist, SearchResponse};

/// Spotify Web API base URL
const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

/// Maximum URIs per add-items request (Spotify API limit)
pub const MAX_URIS_PER_REQUEST: usize = 100;

const TRACK_URI_PREFIX: &str = "spotify:track:";

/// Spotify API connector
///
/// # Example
///
/// ```ignore
/// use provider_spotify::SpotifyApi;
///
/// let api = SpotifyApi::new();
/// let request = api.search_request(token, "Paranoid Android", "Radiohead")?;
/// let response = http_client.execute(request).await?;
/// let id = api.parse_search(&response)?;
/// ```
#[derive(Debug, Clone)]
pub struct SpotifyApi {
    base_url: String,
}

impl Default for SpotifyApi {
    fn default() -> Self {
        Self::new()
    }
}

impl SpotifyApi {
    pub fn new() -> Self {
        Self {
            base_url: SPOTIFY_API_BASE.to_string(),
        }
    }

    /// Point the connector at a different host, e.g. a local stub server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Extract the bare track id from an id, a `spotify:track:` URI or an
    /// `open.spotify.com/track/` URL.
    pub fn normalize_track_id(value: &str) -> Option<&str> {
        let value = value.trim();

        let id = if let Some(rest) = value.strip_prefix(TRACK_URI_PREFIX) {
            rest
        } else if value.contains("open.spotify.com/") {
            let (_, rest) = value.split_once("/track/")?;
            rest.split(|c: char| c == '?' || c == '/' || c == '#')
                .next()
                .unwrap_or_default()
        } else {
            value
        };

        if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
            Some(id)
        } else {
            None
        }
    }

    /// Reject non-2xx responses, surfacing Spotify's error message.
    fn check_status(response: &HttpResponse) -> std::result::Result<(), SpotifyError> {
        if response.is_success() {
            return Ok(());
        }

        let message = response
            .json::<ErrorResponse>()
            .map(|e| e.error.message)
            .or_else(|_| response.text())
            .unwrap_or_default();

        Err(SpotifyError::ApiError {
            status_code: response.status,
            message,
        })
    }
}

impl PlatformApi for SpotifyApi {
    fn platform(&self) -> MusicPlatform {
        MusicPlatform::Spotify
    }

    fn max_items_per_add(&self) -> usize {
        MAX_URIS_PER_REQUEST
    }

    fn search_request(&self, access_token: &str, title: &str, artist: &str) -> Result<HttpRequest> {
        let query = format!("track:{} artist:{}", title.trim(), artist.trim());
        let url = format!(
            "{}/search?q={}&type=track&limit=1",
            self.base_url,
            urlencoding::encode(&query)
        );

        Ok(HttpRequest::new(HttpMethod::Get, url)
            .bearer_token(access_token)
            .header("Accept", "application/json"))
    }

    fn parse_search(&self, response: &HttpResponse) -> Result<Option<String>> {
        Self::check_status(response)?;

        let search: SearchResponse = response
            .json()
            .map_err(|e| SpotifyError::ParseError(e.to_string()))?;

        let found = search
            .tracks
            .and_then(|tracks| tracks.items.into_iter().next())
            .and_then(|track| {
                track.id.or_else(|| {
                    track
                        .uri
                        .as_deref()
                        .and_then(Self::normalize_track_id)
                        .map(str::to_string)
                })
            });

        debug!(found = found.is_some(), "Parsed Spotify search response");
        Ok(found)
    }

    fn track_ref(&self, external_id: &str) -> Option<PlatformRef> {
        Self::normalize_track_id(external_id)
            .map(|id| PlatformRef::new(format!("{}{}", TRACK_URI_PREFIX, id)))
    }

    fn create_playlist_request(
        &self,
        access_token: &str,
        details: &PlaylistDetails,
    ) -> Result<HttpRequest> {
        let body = CreatePlaylistBody {
            name: &details.name,
            description: details.description.as_deref(),
            public: details.is_public,
            collaborative: details.is_collaborative,
        };

        HttpRequest::new(HttpMethod::Post, format!("{}/me/playlists", self.base_url))
            .bearer_token(access_token)
            .json(&body)
    }

    fn parse_created_playlist(&self, response: &HttpResponse) -> Result<CreatedPlaylist> {
        Self::check_status(response)?;

        let playlist: Playlist = response
            .json()
            .map_err(|e| SpotifyError::ParseError(e.to_string()))?;

        let url = playlist
            .external_urls
            .spotify
            .unwrap_or_else(|| format!("https://open.spotify.com/playlist/{}", playlist.id));

        Ok(CreatedPlaylist {
            id: playlist.id,
            url,
        })
    }

    fn add_items_request(
        &self,
        access_token: &str,
        playlist_id: &str,
        refs: &[PlatformRef],
    ) -> Result<HttpRequest> {
        if refs.len() > MAX_URIS_PER_REQUEST {
            return Err(SpotifyError::InvalidRequest(format!(
                "{} URIs exceed the limit of {} per request",
                refs.len(),
                MAX_URIS_PER_REQUEST
            ))
            .into());
        }

        let body = AddTracksBody {
            uris: refs.iter().map(PlatformRef::as_str).collect(),
        };

        HttpRequest::new(
            HttpMethod::Post,
            format!(
                "{}/playlists/{}/tracks",
                self.base_url,
                urlencoding::encode(playlist_id)
            ),
        )
        .bearer_token(access_token)
        .json(&body)
    }
}
