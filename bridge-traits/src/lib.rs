//! # Host Bridge Traits
//!
//! Contracts between the export core and the outside world.
//!
//! ## Overview
//!
//! This crate defines the capabilities the export pipeline requires but that
//! are implemented elsewhere: HTTP transport (see `bridge-desktop`), the
//! per-platform request codecs (see `provider-spotify` and
//! `provider-youtube`), and an injectable clock.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations
//! - [`PlatformApi`](platform::PlatformApi) - Build and parse platform API calls
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Connector
//! crates convert their own error types into it.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.

pub mod error;
pub mod http;
pub mod platform;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use platform::{
    CreatedPlaylist, MusicPlatform, PlatformApi, PlatformCapability, PlatformRef,
    PlaylistDetails,
};
pub use time::{Clock, LogLevel, SystemClock};
