//! # YouTube Provider
//!
//! Implements `PlatformApi` for the YouTube Data API v3, creating playlists
//! that open in YouTube Music.
//!
//! ## Overview
//!
//! This module provides:
//! - Video search by artist and title
//! - Playlist creation with a privacy status
//! - Playlist population, one video per request
//!
//! The Data API charges quota per call and rejects batched inserts, so
//! exports to YouTube run through the sequential writer.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::YouTubeApi;
pub use error::{Result, YouTubeError};
