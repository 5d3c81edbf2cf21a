//! Seeding helpers for tests and local development databases.
//!
//! Production data for curated lists and group playlists is written by the
//! community features; the export worker only reads it.

use sqlx::SqlitePool;

use crate::Result;

/// One song row to seed.
#[derive(Debug, Clone, Copy)]
pub struct SongFixture<'a> {
    pub title: &'a str,
    pub artist: &'a str,
    pub source_platform: &'a str,
    pub source_external_id: Option<&'a str>,
    /// Only meaningful for curated lists.
    pub approved: bool,
}

impl<'a> SongFixture<'a> {
    pub fn new(title: &'a str, artist: &'a str) -> Self {
        Self {
            title,
            artist,
            source_platform: "manual",
            source_external_id: None,
            approved: true,
        }
    }

    pub fn native(mut self, platform: &'a str, external_id: &'a str) -> Self {
        self.source_platform = platform;
        self.source_external_id = Some(external_id);
        self
    }

    pub fn pending(mut self) -> Self {
        self.approved = false;
        self
    }
}

/// Insert a curated list and its songs, positions following slice order.
pub async fn seed_curated_list(
    pool: &SqlitePool,
    list_id: &str,
    name: &str,
    songs: &[SongFixture<'_>],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO curated_lists (id, name, created_at) VALUES (?, ?, 0)")
        .bind(list_id)
        .bind(name)
        .execute(&mut *tx)
        .await?;

    for (position, song) in songs.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO curated_list_songs
                (list_id, title, artist, source_platform, source_external_id, position, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(list_id)
        .bind(song.title)
        .bind(song.artist)
        .bind(song.source_platform)
        .bind(song.source_external_id)
        .bind(position as i64)
        .bind(if song.approved { "approved" } else { "pending" })
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Insert one playlist of a group and its songs.
pub async fn seed_group_playlist(
    pool: &SqlitePool,
    group_id: &str,
    playlist_id: &str,
    sort_order: Option<i64>,
    created_at: i64,
    songs: &[SongFixture<'_>],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO group_playlists (id, group_id, name, sort_order, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(playlist_id)
    .bind(group_id)
    .bind(playlist_id)
    .bind(sort_order)
    .bind(created_at)
    .execute(&mut *tx)
    .await?;

    for (position, song) in songs.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO group_playlist_songs
                (playlist_id, title, artist, source_platform, source_external_id, position)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(playlist_id)
        .bind(song.title)
        .bind(song.artist)
        .bind(song.source_platform)
        .bind(song.source_external_id)
        .bind(position as i64)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
