//! Global track identity cache.
//!
//! Maps a normalized `(title, artist)` pair to an id on a target platform so
//! repeat exports of popular songs skip the platform search entirely.

use async_trait::async_trait;
use bridge_traits::{
    platform::MusicPlatform,
    time::{Clock, SystemClock},
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::models::{CacheEntry, TrackRecord};

/// SQLite caps bound parameters per statement; stay well below it.
const PREFETCH_CHUNK_SIZE: usize = 500;

/// Normalize a `(title, artist)` pair into a cache key.
///
/// Case, punctuation and repeated whitespace are ignored, so
/// `("Hey Jude!", "The  Beatles")` and `("hey jude", "the beatles")` share a key.
pub fn normalize_track_key(title: &str, artist: &str) -> String {
    format!("{}|{}", normalize_component(artist), normalize_component(title))
}

fn normalize_component(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of a batched cache lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePrefetch {
    /// Normalized key to external id.
    pub map: HashMap<String, String>,
    pub hits: usize,
    pub misses: usize,
}

impl CachePrefetch {
    pub fn lookup(&self, title: &str, artist: &str) -> Option<&str> {
        self.map
            .get(&normalize_track_key(title, artist))
            .map(String::as_str)
    }
}

/// Read and write-back contract of the identity cache.
#[async_trait]
pub trait TrackIdentityCache: Send + Sync {
    /// Look up every track in as few queries as possible.
    ///
    /// `hits`/`misses` count input tracks, so duplicates are counted each time.
    async fn prefetch(
        &self,
        tracks: &[TrackRecord],
        platform: MusicPlatform,
    ) -> Result<CachePrefetch>;

    /// Upsert resolved mappings. Returns the number of entries written.
    async fn write_back(&self, entries: &[CacheEntry], platform: MusicPlatform) -> Result<usize>;
}

/// SQLite implementation of TrackIdentityCache
pub struct SqliteTrackIdentityCache {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteTrackIdentityCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl TrackIdentityCache for SqliteTrackIdentityCache {
    #[instrument(skip(self, tracks), fields(tracks = tracks.len(), platform = %platform))]
    async fn prefetch(
        &self,
        tracks: &[TrackRecord],
        platform: MusicPlatform,
    ) -> Result<CachePrefetch> {
        let keys: Vec<String> = tracks
            .iter()
            .map(|t| normalize_track_key(&t.title, &t.artist))
            .collect();
        let unique: Vec<&String> = keys
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let mut map = HashMap::with_capacity(unique.len());
        for chunk in unique.chunks(PREFETCH_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT normalized_key, external_id FROM track_identity_cache WHERE platform = ",
            );
            builder.push_bind(platform.as_str());
            builder.push(" AND normalized_key IN (");
            let mut separated = builder.separated(", ");
            for key in chunk {
                separated.push_bind(key.as_str());
            }
            separated.push_unseparated(")");

            let rows = builder
                .build_query_as::<(String, String)>()
                .fetch_all(&self.pool)
                .await?;
            map.extend(rows);
        }

        let hits = keys.iter().filter(|k| map.contains_key(*k)).count();
        let prefetch = CachePrefetch {
            hits,
            misses: keys.len() - hits,
            map,
        };

        debug!(
            hits = prefetch.hits,
            misses = prefetch.misses,
            "Identity cache prefetch complete"
        );
        Ok(prefetch)
    }

    #[instrument(skip(self, entries), fields(entries = entries.len(), platform = %platform))]
    async fn write_back(&self, entries: &[CacheEntry], platform: MusicPlatform) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let now = self.clock.unix_timestamp();
        let mut written = 0;
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let key = normalize_track_key(&entry.title, &entry.artist);
            if key == "|" || entry.external_id.trim().is_empty() {
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO track_identity_cache
                    (normalized_key, platform, external_id, title, artist, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(normalized_key, platform) DO UPDATE SET
                    external_id = excluded.external_id,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&key)
            .bind(platform.as_str())
            .bind(entry.external_id.trim())
            .bind(&entry.title)
            .bind(&entry.artist)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }

        tx.commit().await?;
        debug!(written, "Identity cache write-back committed");
        Ok(written)
    }
}
