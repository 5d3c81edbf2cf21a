//! # Library Module
//!
//! Owns the export database schema and the collaborators the export worker
//! reads from.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pooling and migrations
//! - The track source (curated lists and group playlists)
//! - The global track identity cache

pub mod db;
pub mod error;
pub mod fixtures;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{CacheEntry, PlaylistSelector, SourceType, TrackRecord};
pub use repositories::{
    normalize_track_key, CachePrefetch, SqliteTrackIdentityCache, SqliteTrackSource,
    TrackIdentityCache, TrackSource,
};
