//! # Spotify Provider
//!
//! Implements `PlatformApi` for the Spotify Web API.
//!
//! ## Overview
//!
//! This module provides:
//! - Track search by title and artist
//! - Playlist creation on the current user's account
//! - Bulk playlist population (up to 100 URIs per request)
//! - Normalization of ids given as `spotify:track:` URIs or open.spotify.com URLs
//!
//! Requests are only built and parsed here. Execution, rate limiting and
//! retries belong to the export pipeline.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::SpotifyApi;
pub use error::{Result, SpotifyError};
