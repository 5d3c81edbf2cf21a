//! # Export Module
//!
//! Turns internal song collections into playlists on external music
//! platforms, as asynchronous background jobs.
//!
//! ## Overview
//!
//! A job is created `pending` by the request layer. A worker claims it and:
//! - fetches the user's platform credentials
//! - loads the source tracks in export order
//! - resolves each track to a platform reference (native id, identity
//!   cache, or platform search)
//! - creates the destination playlist and populates it
//!
//! Progress, partial failures and rate-limit telemetry are persisted on the
//! job record throughout. Cancellation is cooperative: workers re-read the
//! job status at fixed checkpoints.
//!
//! ## Components
//!
//! - **Job State Machine** (`job`): job record, statuses and field patches
//! - **Job Store** (`repository`): atomic claim and guarded updates
//! - **Progress Reporter** (`reporter`): progress writes and cancellation checks
//! - **Rate-Limited Client** (`rate_limit`): 429 handling with exponential backoff
//! - **Track Resolver** (`resolver`): three-tier track resolution
//! - **Playlist Writers** (`writer`): bulk-batch and sequential-quota population
//! - **Export Coordinator** (`coordinator`): orchestration and error boundary

pub mod config;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod rate_limit;
pub mod reporter;
pub mod repository;
pub mod resolver;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use config::ExportConfig;
pub use coordinator::{ExportCoordinator, HealthReport, PlatformRegistry, StartResult};
pub use error::{ExportError, Result};
pub use job::{ExportJob, ExportJobId, ExportRequest, ExportStatus, JobUpdate};
pub use rate_limit::{BackoffPolicy, RateLimitedClient};
pub use reporter::ProgressReporter;
pub use repository::{ExportJobStore, SqliteExportJobStore};
pub use resolver::{CacheStats, Resolution, ResolveOutcome, TrackResolver};
pub use writer::{BulkWriter, PlaylistWriter, SequentialWriter, WriteOutcome, WriteRequest};
