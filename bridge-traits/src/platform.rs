//! Music Platform Contracts
//!
//! Describes the external music platforms a playlist can be exported to and
//! the request/response codec each connector provides. Connectors only build
//! [`HttpRequest`]s and parse [`HttpResponse`]s; executing them is left to the
//! caller so every outbound call can share one rate-limit policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};
use crate::http::{HttpRequest, HttpResponse};

/// Target platform for an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MusicPlatform {
    Spotify,
    YoutubeMusic,
}

/// How a platform accepts new playlist entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformCapability {
    /// Many track identifiers per "add" call.
    BulkBatch,
    /// One track per "add" call with strict per-request pacing.
    SequentialQuota,
}

impl MusicPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            MusicPlatform::Spotify => "spotify",
            MusicPlatform::YoutubeMusic => "youtube_music",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MusicPlatform::Spotify => "Spotify",
            MusicPlatform::YoutubeMusic => "YouTube Music",
        }
    }

    pub fn capability(&self) -> PlatformCapability {
        match self {
            MusicPlatform::Spotify => PlatformCapability::BulkBatch,
            MusicPlatform::YoutubeMusic => PlatformCapability::SequentialQuota,
        }
    }

    /// Lenient parse used for stored `source_platform` values, which come
    /// from several importers with their own spelling.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "spotify" => Some(MusicPlatform::Spotify),
            "youtube_music" | "youtube-music" | "youtubemusic" | "youtube" | "ytm" => {
                Some(MusicPlatform::YoutubeMusic)
            }
            _ => None,
        }
    }
}

impl fmt::Display for MusicPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MusicPlatform {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
            .ok_or_else(|| BridgeError::NotAvailable(format!("Unsupported music platform: {}", s)))
    }
}

/// A track reference in the target platform's own format
/// (`spotify:track:<id>`, a bare YouTube video id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformRef(String);

impl PlatformRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User-facing attributes of the playlist to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistDetails {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_collaborative: bool,
}

/// Identity of a playlist created on the target platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPlaylist {
    pub id: String,
    pub url: String,
}

/// Request codec for one target platform.
///
/// All methods are synchronous. `parse_*` methods receive responses that were
/// not rate limited; any other non-2xx status should be reported as an error.
pub trait PlatformApi: Send + Sync {
    /// Platform this connector talks to.
    fn platform(&self) -> MusicPlatform;

    /// Maximum number of references accepted by one add request.
    fn max_items_per_add(&self) -> usize;

    /// Build a text search for one track.
    fn search_request(&self, access_token: &str, title: &str, artist: &str)
        -> Result<HttpRequest>;

    /// Extract the best match's native id, `None` when nothing matched.
    fn parse_search(&self, response: &HttpResponse) -> Result<Option<String>>;

    /// Convert a native id (or a URI/URL carrying one) into a reference.
    ///
    /// Returns `None` when the value does not contain a usable id.
    fn track_ref(&self, external_id: &str) -> Option<PlatformRef>;

    fn create_playlist_request(
        &self,
        access_token: &str,
        details: &PlaylistDetails,
    ) -> Result<HttpRequest>;

    fn parse_created_playlist(&self, response: &HttpResponse) -> Result<CreatedPlaylist>;

    /// Build an add request. Callers never pass more than
    /// [`max_items_per_add`](Self::max_items_per_add) references.
    fn add_items_request(
        &self,
        access_token: &str,
        playlist_id: &str,
        refs: &[PlatformRef],
    ) -> Result<HttpRequest>;
}
