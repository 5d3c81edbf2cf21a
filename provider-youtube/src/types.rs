//! YouTube Data API v3 request and response types

use serde::{Deserialize, Serialize};

pub const VIDEO_KIND: &str = "youtube#video";

/// `search.list` response.
///
/// See: https://developers.google.com/youtube/v3/docs/search/list
#[derive(Debug, Deserialize)]
pub struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    pub id: ResourceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

/// `playlists.insert` body.
#[derive(Debug, Serialize)]
pub struct PlaylistResource<'a> {
    pub snippet: PlaylistSnippet<'a>,
    pub status: PlaylistStatus,
}

#[derive(Debug, Serialize)]
pub struct PlaylistSnippet<'a> {
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistStatus {
    pub privacy_status: PrivacyStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    Private,
}

/// Response of `playlists.insert`.
#[derive(Debug, Deserialize)]
pub struct CreatedPlaylistResource {
    pub id: String,
}

/// `playlistItems.insert` body.
#[derive(Debug, Serialize)]
pub struct PlaylistItemResource<'a> {
    pub snippet: PlaylistItemSnippet<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemSnippet<'a> {
    pub playlist_id: &'a str,
    pub resource_id: ResourceId,
}

/// Error envelope: `{"error": {"code": 403, "message": "...", "errors": [{"reason": "..."}]}}`.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub reason: String,
}
