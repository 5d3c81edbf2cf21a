//! Domain models for export sources and the identity cache.

use bridge_traits::platform::MusicPlatform;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LibraryError;

/// Sentinel selector value meaning "every playlist under the source".
pub const SELECT_ALL: &str = "all";

/// Where the songs of an export come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A community's curated list. Only approved songs are exported.
    CuratedList,
    /// A group's playlists.
    GroupPlaylist,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::CuratedList => "curated_list",
            SourceType::GroupPlaylist => "group_playlist",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "curated_list" => Ok(SourceType::CuratedList),
            "group_playlist" => Ok(SourceType::GroupPlaylist),
            other => Err(LibraryError::InvalidInput {
                field: "source_type".to_string(),
                message: format!("unknown source type '{}'", other),
            }),
        }
    }
}

/// Which playlists of a source to export.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlaylistSelector {
    All,
    Playlist(String),
}

impl PlaylistSelector {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(SELECT_ALL) {
            PlaylistSelector::All
        } else {
            PlaylistSelector::Playlist(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlaylistSelector::All => SELECT_ALL,
            PlaylistSelector::Playlist(id) => id,
        }
    }
}

impl fmt::Display for PlaylistSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PlaylistSelector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PlaylistSelector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(PlaylistSelector::parse(&value))
    }
}

/// An internal song reference carried through the export pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub title: String,
    pub artist: String,
    /// Platform the song was originally shared from, as stored.
    pub source_platform: String,
    pub source_external_id: Option<String>,
    /// Position in the linearized export sequence.
    pub order_hint: i64,
}

impl TrackRecord {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            source_platform: String::new(),
            source_external_id: None,
            order_hint: 0,
        }
    }

    pub fn with_source(
        mut self,
        platform: impl Into<String>,
        external_id: Option<impl Into<String>>,
    ) -> Self {
        self.source_platform = platform.into();
        self.source_external_id = external_id.map(Into::into);
        self
    }

    pub fn with_order_hint(mut self, order_hint: i64) -> Self {
        self.order_hint = order_hint;
        self
    }

    /// The stored id, when this track already lives on `platform`.
    pub fn native_id(&self, platform: MusicPlatform) -> Option<&str> {
        if MusicPlatform::parse(&self.source_platform) != Some(platform) {
            return None;
        }
        self.source_external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// A resolved `(title, artist) -> external_id` mapping queued for the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub title: String,
    pub artist: String,
    pub external_id: String,
}

impl CacheEntry {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            external_id: external_id.into(),
        }
    }
}
