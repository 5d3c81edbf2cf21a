//! # Export Job State Machine
//!
//! Models one request to materialize an external playlist from internal
//! tracks, and the field patches the worker persists while running it.
//!
//! ## State Machine
//!
//! ```text
//! Pending ──→ Processing ──→ Completed
//!    │            │
//!    │            ├──→ Failed
//!    └────────────┴──→ Cancelled
//! ```
//!
//! Terminal states are final. The cancellation path may move a job out of
//! `Pending` or `Processing` at any time, independent of the worker.

use crate::{ExportError, Result};
use bridge_traits::platform::{MusicPlatform, PlaylistDetails};
use core_auth::UserId;
use core_library::{PlaylistSelector, SourceType};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for an export job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportJobId(Uuid);

impl ExportJobId {
    /// Create a new random export job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an export job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| ExportError::InvalidJobId(e.to_string()))?,
        ))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ExportJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExportJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ExportJobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The current status of an export job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    /// Created by the request handler, waiting for a worker
    Pending,
    /// Claimed by exactly one worker
    Processing,
    /// Playlist created and populated (possibly with partial failures)
    Completed,
    /// Aborted by a job-level error
    Failed,
    /// Cancelled by the user
    Cancelled,
}

impl ExportStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExportStatus::Completed | ExportStatus::Failed | ExportStatus::Cancelled
        )
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Processing => "processing",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
            ExportStatus::Cancelled => "cancelled",
        }
    }

    /// States a job may be in immediately before entering `self`.
    pub fn predecessors(&self) -> &'static [ExportStatus] {
        match self {
            ExportStatus::Pending => &[],
            ExportStatus::Processing => &[ExportStatus::Pending],
            ExportStatus::Completed | ExportStatus::Failed => &[ExportStatus::Processing],
            ExportStatus::Cancelled => &[ExportStatus::Pending, ExportStatus::Processing],
        }
    }
}

impl FromStr for ExportStatus {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ExportStatus::Pending),
            "processing" => Ok(ExportStatus::Processing),
            "completed" => Ok(ExportStatus::Completed),
            "failed" => Ok(ExportStatus::Failed),
            "cancelled" => Ok(ExportStatus::Cancelled),
            _ => Err(ExportError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Export Job Entity
// ============================================================================

/// Parameters supplied by the request that creates a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub user_id: UserId,
    pub platform: MusicPlatform,
    pub source_type: SourceType,
    pub source_id: String,
    pub playlist_selector: PlaylistSelector,
    pub playlist_name: String,
    pub description: Option<String>,
    /// Only honoured by bulk-batch platforms.
    pub is_public: bool,
    /// Only honoured by bulk-batch platforms.
    pub is_collaborative: bool,
}

/// An export job as stored in the job store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: ExportJobId,
    pub user_id: UserId,
    pub platform: MusicPlatform,
    pub source_type: SourceType,
    pub source_id: String,
    pub playlist_selector: PlaylistSelector,
    pub playlist_name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_collaborative: bool,

    pub status: ExportStatus,
    /// 0-100
    pub progress: u8,
    pub current_step: Option<String>,
    pub total_tracks: u32,
    pub exported_tracks: u32,
    pub failed_tracks: u32,

    pub retry_count: u32,
    /// Unix milliseconds
    pub next_retry_at: Option<i64>,
    pub last_error: Option<String>,

    pub external_playlist_id: Option<String>,
    pub external_playlist_url: Option<String>,
    pub error_message: Option<String>,

    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl ExportJob {
    /// Create a new job in pending state
    pub fn new(request: ExportRequest) -> Self {
        Self {
            id: ExportJobId::new(),
            user_id: request.user_id,
            platform: request.platform,
            source_type: request.source_type,
            source_id: request.source_id,
            playlist_selector: request.playlist_selector,
            playlist_name: request.playlist_name,
            description: request.description,
            is_public: request.is_public,
            is_collaborative: request.is_collaborative,
            status: ExportStatus::Pending,
            progress: 0,
            current_step: None,
            total_tracks: 0,
            exported_tracks: 0,
            failed_tracks: 0,
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
            external_playlist_id: None,
            external_playlist_url: None,
            error_message: None,
            created_at: current_timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Attributes of the playlist to create on the target platform.
    pub fn playlist_details(&self) -> PlaylistDetails {
        PlaylistDetails {
            name: self.playlist_name.clone(),
            description: self.description.clone(),
            is_public: self.is_public,
            is_collaborative: self.is_collaborative,
        }
    }
}

// ============================================================================
// Field Patches
// ============================================================================

/// A partial update of a job record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: Option<ExportStatus>,
    pub progress: Option<u8>,
    pub current_step: Option<String>,
    pub total_tracks: Option<u32>,
    pub exported_tracks: Option<u32>,
    pub failed_tracks: Option<u32>,
    pub retry_count: Option<u32>,
    pub next_retry_at: Option<i64>,
    pub last_error: Option<String>,
    pub external_playlist_id: Option<String>,
    pub external_playlist_url: Option<String>,
    pub error_message: Option<String>,
    pub completed_at: Option<i64>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_total_tracks(mut self, total: u32) -> Self {
        self.total_tracks = Some(total);
        self
    }

    pub fn with_counts(mut self, exported: u32, failed: u32) -> Self {
        self.exported_tracks = Some(exported);
        self.failed_tracks = Some(failed);
        self
    }

    pub fn with_retry(mut self, retry_count: u32, next_retry_at: i64, last_error: String) -> Self {
        self.retry_count = Some(retry_count);
        self.next_retry_at = Some(next_retry_at);
        self.last_error = Some(last_error);
        self
    }

    pub fn with_external_playlist(mut self, id: impl Into<String>, url: impl Into<String>) -> Self {
        self.external_playlist_id = Some(id.into());
        self.external_playlist_url = Some(url.into());
        self
    }

    /// Terminal success patch.
    pub fn completed(exported: u32, failed: u32, completed_at: i64) -> Self {
        Self {
            status: Some(ExportStatus::Completed),
            progress: Some(100),
            current_step: Some("completed".to_string()),
            exported_tracks: Some(exported),
            failed_tracks: Some(failed),
            completed_at: Some(completed_at),
            ..Self::default()
        }
    }

    /// Terminal failure patch.
    pub fn failed(error_message: impl Into<String>, completed_at: i64) -> Self {
        Self {
            status: Some(ExportStatus::Failed),
            current_step: Some("failed".to_string()),
            error_message: Some(error_message.into()),
            completed_at: Some(completed_at),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Get current Unix timestamp in seconds
fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
