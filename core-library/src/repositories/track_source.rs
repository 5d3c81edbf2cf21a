//! Track source: loads the songs an export job should materialize.

use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::models::{PlaylistSelector, SourceType, TrackRecord};

/// Read access to the songs behind an export source.
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// List the tracks of a source in export order.
    ///
    /// # Ordering
    ///
    /// - Curated lists: approved songs by position. The selector is ignored
    ///   because a curated list is a single sequence.
    /// - Group playlists, one selected: that playlist's songs by position.
    /// - Group playlists, `all`: playlists by their own sort order (unset
    ///   last, then creation time), then songs by position.
    ///
    /// An unknown source yields an empty list, not an error.
    async fn list_tracks(
        &self,
        source_type: SourceType,
        source_id: &str,
        selector: &PlaylistSelector,
    ) -> Result<Vec<TrackRecord>>;
}

/// SQLite implementation of TrackSource
pub struct SqliteTrackSource {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SongRow {
    title: String,
    artist: String,
    source_platform: String,
    source_external_id: Option<String>,
}

impl SqliteTrackSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn curated_list(&self, list_id: &str) -> Result<Vec<SongRow>> {
        let rows = query_as::<_, SongRow>(
            r#"
            SELECT title, artist, source_platform, source_external_id
            FROM curated_list_songs
            WHERE list_id = ? AND status = 'approved'
            ORDER BY position ASC, id ASC
            "#,
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn group_playlist(&self, group_id: &str, playlist_id: &str) -> Result<Vec<SongRow>> {
        let rows = query_as::<_, SongRow>(
            r#"
            SELECT s.title, s.artist, s.source_platform, s.source_external_id
            FROM group_playlist_songs s
            JOIN group_playlists p ON p.id = s.playlist_id
            WHERE p.group_id = ? AND p.id = ?
            ORDER BY s.position ASC, s.id ASC
            "#,
        )
        .bind(group_id)
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn all_group_playlists(&self, group_id: &str) -> Result<Vec<SongRow>> {
        let rows = query_as::<_, SongRow>(
            r#"
            SELECT s.title, s.artist, s.source_platform, s.source_external_id
            FROM group_playlist_songs s
            JOIN group_playlists p ON p.id = s.playlist_id
            WHERE p.group_id = ?
            ORDER BY
                p.sort_order IS NULL,
                p.sort_order ASC,
                p.created_at ASC,
                p.id ASC,
                s.position ASC,
                s.id ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[async_trait]
impl TrackSource for SqliteTrackSource {
    #[instrument(skip(self), fields(source_type = %source_type, selector = %selector))]
    async fn list_tracks(
        &self,
        source_type: SourceType,
        source_id: &str,
        selector: &PlaylistSelector,
    ) -> Result<Vec<TrackRecord>> {
        let rows = match (source_type, selector) {
            (SourceType::CuratedList, _) => self.curated_list(source_id).await?,
            (SourceType::GroupPlaylist, PlaylistSelector::Playlist(playlist_id)) => {
                self.group_playlist(source_id, playlist_id).await?
            }
            (SourceType::GroupPlaylist, PlaylistSelector::All) => {
                self.all_group_playlists(source_id).await?
            }
        };

        let tracks: Vec<TrackRecord> = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| TrackRecord {
                title: row.title,
                artist: row.artist,
                source_platform: row.source_platform,
                source_external_id: row.source_external_id,
                order_hint: index as i64,
            })
            .collect();

        debug!(count = tracks.len(), "Loaded source tracks");
        Ok(tracks)
    }
}
