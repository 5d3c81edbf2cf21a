//! # Repository Pattern Implementation
//!
//! Read/write contracts the export worker consumes, each with a SQLite
//! implementation backed by sqlx.
//!
//! ## Available Repositories
//!
//! - `TrackSource` - Songs of curated lists and group playlists, in export order
//! - `TrackIdentityCache` - Normalized `(title, artist)` to platform id mappings

pub mod track_cache;
pub mod track_source;

pub use track_cache::{
    normalize_track_key, CachePrefetch, SqliteTrackIdentityCache, TrackIdentityCache,
};
pub use track_source::{SqliteTrackSource, TrackSource};
