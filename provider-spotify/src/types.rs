//! Spotify Web API request and response types
//!
//! Only the fields the exporter reads are modelled.

use serde::{Deserialize, Serialize};

/// `GET /v1/search` response.
///
/// See: https://developer.spotify.com/documentation/web-api/reference/search
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub tracks: Option<Paging<Track>>,
}

#[derive(Debug, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct Track {
    pub id: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

/// `POST /v1/me/playlists` body.
#[derive(Debug, Serialize)]
pub struct CreatePlaylistBody<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub public: bool,
    pub collaborative: bool,
}

/// Playlist object returned on creation.
#[derive(Debug, Deserialize)]
pub struct Playlist {
    pub id: String,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

/// `POST /v1/playlists/{id}/tracks` body.
#[derive(Debug, Serialize)]
pub struct AddTracksBody<'a> {
    pub uris: Vec<&'a str>,
}

/// Spotify error envelope: `{"error": {"status": 404, "message": "..."}}`.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Deserialize)]
pub struct ErrorObject {
    #[serde(default)]
    pub message: String,
}
