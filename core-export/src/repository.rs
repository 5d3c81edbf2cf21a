//! # Export Job Store
//!
//! Persistence for export jobs.
//!
//! ## Overview
//!
//! The store is the only synchronization point between workers and between a
//! worker and the cancellation path:
//! - `claim` is a single atomic statement, so two workers never hold one job
//! - `update` refuses to touch terminal jobs, so a late progress write can
//!   never resurrect a cancelled export
//! - `get_status` always reads through to the database

use crate::{ExportError, ExportJob, ExportJobId, ExportStatus, JobUpdate, Result};
use async_trait::async_trait;
use bridge_traits::{
    platform::MusicPlatform,
    time::{Clock, SystemClock},
};
use core_auth::UserId;
use core_library::{PlaylistSelector, SourceType};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Step recorded when a worker claims a job.
pub const CLAIMED_STEP: &str = "fetching credentials";

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for export job persistence
#[async_trait]
pub trait ExportJobStore: Send + Sync {
    /// Insert a new job
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn insert(&self, job: &ExportJob) -> Result<()>;

    /// Atomically claim a job and mark it `processing`.
    ///
    /// With `None`, claims the oldest pending job whose `next_retry_at` has
    /// passed. With an id, claims that job if it is pending, or re-enters it
    /// if it is already processing. Terminal jobs are never returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn claim(&self, job_id: Option<&ExportJobId>) -> Result<Option<ExportJob>>;

    /// Apply a field patch.
    ///
    /// Returns `false` when nothing was written because the job is missing,
    /// already terminal, or not in a state the patch's status may follow.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn update(&self, job_id: &ExportJobId, update: &JobUpdate) -> Result<bool>;

    /// Read the current status
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::JobNotFound`] if the job does not exist
    async fn get_status(&self, job_id: &ExportJobId) -> Result<ExportStatus>;

    /// Find a job by ID
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn find_by_id(&self, job_id: &ExportJobId) -> Result<Option<ExportJob>>;

    /// Move a pending or processing job to `cancelled`.
    ///
    /// Returns `false` if the job was already terminal or does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn cancel(&self, job_id: &ExportJobId) -> Result<bool>;

    /// Count jobs in a status
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn count_by_status(&self, status: ExportStatus) -> Result<u64>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of ExportJobStore
pub struct SqliteExportJobStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteExportJobStore {
    /// Create a new SQLite export job store
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

/// Database row representation of an export job
#[derive(Debug, FromRow)]
struct ExportJobRow {
    id: String,
    user_id: String,
    platform: String,
    source_type: String,
    source_id: String,
    playlist_selector: String,
    playlist_name: String,
    description: Option<String>,
    is_public: bool,
    is_collaborative: bool,
    status: String,
    progress: i64,
    current_step: Option<String>,
    total_tracks: i64,
    exported_tracks: i64,
    failed_tracks: i64,
    retry_count: i64,
    next_retry_at: Option<i64>,
    last_error: Option<String>,
    external_playlist_id: Option<String>,
    external_playlist_url: Option<String>,
    error_message: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

const JOB_COLUMNS: &str = "id, user_id, platform, source_type, source_id, playlist_selector, \
    playlist_name, description, is_public, is_collaborative, status, progress, current_step, \
    total_tracks, exported_tracks, failed_tracks, retry_count, next_retry_at, last_error, \
    external_playlist_id, external_playlist_url, error_message, created_at, started_at, \
    completed_at";

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

impl TryFrom<ExportJobRow> for ExportJob {
    type Error = ExportError;

    fn try_from(row: ExportJobRow) -> Result<Self> {
        let user_id = UserId::from_string(&row.user_id)
            .map_err(|e| ExportError::JobStore(format!("Invalid user_id: {}", e)))?;
        let platform = MusicPlatform::parse(&row.platform)
            .ok_or_else(|| ExportError::JobStore(format!("Invalid platform: {}", row.platform)))?;
        let source_type: SourceType = row
            .source_type
            .parse()
            .map_err(|_| ExportError::JobStore(format!("Invalid source_type: {}", row.source_type)))?;

        Ok(ExportJob {
            id: ExportJobId::from_string(&row.id)?,
            user_id,
            platform,
            source_type,
            source_id: row.source_id,
            playlist_selector: PlaylistSelector::parse(&row.playlist_selector),
            playlist_name: row.playlist_name,
            description: row.description,
            is_public: row.is_public,
            is_collaborative: row.is_collaborative,
            status: row.status.parse()?,
            progress: row.progress.clamp(0, 100) as u8,
            current_step: row.current_step,
            total_tracks: to_u32(row.total_tracks),
            exported_tracks: to_u32(row.exported_tracks),
            failed_tracks: to_u32(row.failed_tracks),
            retry_count: to_u32(row.retry_count),
            next_retry_at: row.next_retry_at,
            last_error: row.last_error,
            external_playlist_id: row.external_playlist_id,
            external_playlist_url: row.external_playlist_url,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// `'a', 'b'` list for an `IN (...)` clause. Values come from the enum only.
fn status_list(statuses: &[ExportStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn db_error(e: sqlx::Error) -> ExportError {
    ExportError::JobStore(e.to_string())
}

#[async_trait]
impl ExportJobStore for SqliteExportJobStore {
    async fn insert(&self, job: &ExportJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO export_jobs (
                id, user_id, platform, source_type, source_id, playlist_selector,
                playlist_name, description, is_public, is_collaborative,
                status, progress, current_step, total_tracks, exported_tracks, failed_tracks,
                retry_count, next_retry_at, last_error,
                external_playlist_id, external_playlist_url, error_message,
                created_at, started_at, completed_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.user_id.to_string())
        .bind(job.platform.as_str())
        .bind(job.source_type.as_str())
        .bind(&job.source_id)
        .bind(job.playlist_selector.as_str())
        .bind(&job.playlist_name)
        .bind(&job.description)
        .bind(job.is_public)
        .bind(job.is_collaborative)
        .bind(job.status.as_str())
        .bind(i64::from(job.progress))
        .bind(&job.current_step)
        .bind(i64::from(job.total_tracks))
        .bind(i64::from(job.exported_tracks))
        .bind(i64::from(job.failed_tracks))
        .bind(i64::from(job.retry_count))
        .bind(job.next_retry_at)
        .bind(&job.last_error)
        .bind(&job.external_playlist_id)
        .bind(&job.external_playlist_url)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(self.clock.unix_timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    #[instrument(skip(self), fields(job_id = ?job_id))]
    async fn claim(&self, job_id: Option<&ExportJobId>) -> Result<Option<ExportJob>> {
        let now = self.clock.unix_timestamp();

        let row = match job_id {
            None => {
                let sql = format!(
                    r#"
                    UPDATE export_jobs
                    SET status = 'processing', started_at = ?, current_step = ?, updated_at = ?
                    WHERE id = (
                        SELECT id FROM export_jobs
                        WHERE status = 'pending'
                          AND (next_retry_at IS NULL OR next_retry_at <= ?)
                        ORDER BY created_at ASC, rowid ASC
                        LIMIT 1
                    )
                    AND status = 'pending'
                    RETURNING {}
                    "#,
                    JOB_COLUMNS
                );
                sqlx::query_as::<_, ExportJobRow>(&sql)
                    .bind(now)
                    .bind(CLAIMED_STEP)
                    .bind(now)
                    .bind(self.clock.unix_timestamp_millis())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_error)?
            }
            Some(id) => {
                let sql = format!(
                    r#"
                    UPDATE export_jobs
                    SET status = 'processing',
                        started_at = COALESCE(started_at, ?),
                        current_step = ?,
                        updated_at = ?
                    WHERE id = ? AND status IN ('pending', 'processing')
                    RETURNING {}
                    "#,
                    JOB_COLUMNS
                );
                sqlx::query_as::<_, ExportJobRow>(&sql)
                    .bind(now)
                    .bind(CLAIMED_STEP)
                    .bind(now)
                    .bind(id.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_error)?
            }
        };

        match row {
            Some(row) => {
                let job = ExportJob::try_from(row)?;
                debug!(job_id = %job.id, "Claimed export job");
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, job_id: &ExportJobId, update: &JobUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }

        let allowed_from: &[ExportStatus] = match update.status {
            Some(next) => next.predecessors(),
            None => &[ExportStatus::Pending, ExportStatus::Processing],
        };
        if allowed_from.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            r#"
            UPDATE export_jobs SET
                status = COALESCE(?, status),
                progress = COALESCE(?, progress),
                current_step = COALESCE(?, current_step),
                total_tracks = COALESCE(?, total_tracks),
                exported_tracks = COALESCE(?, exported_tracks),
                failed_tracks = COALESCE(?, failed_tracks),
                retry_count = COALESCE(?, retry_count),
                next_retry_at = COALESCE(?, next_retry_at),
                last_error = COALESCE(?, last_error),
                external_playlist_id = COALESCE(?, external_playlist_id),
                external_playlist_url = COALESCE(?, external_playlist_url),
                error_message = COALESCE(?, error_message),
                completed_at = COALESCE(?, completed_at),
                updated_at = ?
            WHERE id = ? AND status IN ({})
            "#,
            status_list(allowed_from)
        );

        let result = sqlx::query(&sql)
            .bind(update.status.map(|s| s.as_str()))
            .bind(update.progress.map(i64::from))
            .bind(&update.current_step)
            .bind(update.total_tracks.map(i64::from))
            .bind(update.exported_tracks.map(i64::from))
            .bind(update.failed_tracks.map(i64::from))
            .bind(update.retry_count.map(i64::from))
            .bind(update.next_retry_at)
            .bind(&update.last_error)
            .bind(&update.external_playlist_id)
            .bind(&update.external_playlist_url)
            .bind(&update.error_message)
            .bind(update.completed_at)
            .bind(self.clock.unix_timestamp())
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_status(&self, job_id: &ExportJobId) -> Result<ExportStatus> {
        let status: Option<(String,)> = sqlx::query_as("SELECT status FROM export_jobs WHERE id = ?")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match status {
            Some((status,)) => status.parse(),
            None => Err(ExportError::JobNotFound {
                job_id: job_id.to_string(),
            }),
        }
    }

    async fn find_by_id(&self, job_id: &ExportJobId) -> Result<Option<ExportJob>> {
        let sql = format!("SELECT {} FROM export_jobs WHERE id = ?", JOB_COLUMNS);
        let row = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(ExportJob::try_from).transpose()
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn cancel(&self, job_id: &ExportJobId) -> Result<bool> {
        let now = self.clock.unix_timestamp();
        let result = sqlx::query(
            r#"
            UPDATE export_jobs
            SET status = 'cancelled', current_step = 'cancelled', completed_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('pending', 'processing')
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(job_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_by_status(&self, status: ExportStatus) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM export_jobs WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(count.max(0) as u64)
    }
}
