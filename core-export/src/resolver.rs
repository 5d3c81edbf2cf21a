//! # Track Resolver
//!
//! Maps internal tracks to references on the target platform.
//!
//! ## Resolution Tiers
//!
//! 1. **Native**: the track was shared from the target platform and carries
//!    its id. The id is converted directly; no cache or network access.
//! 2. **Cache hit**: the identity cache already knows the id.
//! 3. **Search**: one platform search per remaining track, through the
//!    rate-limited client.
//!
//! The cache is prefetched once for all tracks that need a lookup, so the
//! per-track loop only consults an in-memory map. Output order always matches
//! input order. Mappings discovered by tiers 1 and 3 are written back to the
//! cache in a detached task once the loop ends.

use crate::{
    ExportConfig, ExportError, ProgressReporter, RateLimitedClient, Result,
};
use bridge_traits::platform::{MusicPlatform, PlatformApi, PlatformRef};
use core_auth::AccessToken;
use core_library::{CacheEntry, CachePrefetch, TrackIdentityCache, TrackRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Cache effectiveness for one resolution run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// Result of a resolution run that was not cancelled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOutcome {
    /// One slot per input track, in input order. `None` marks a track that
    /// could not be matched.
    pub references: Vec<Option<PlatformRef>>,
    pub failed_titles: Vec<String>,
    pub cache_stats: CacheStats,
    /// Tracks converted without a lookup.
    pub native: usize,
}

impl ResolveOutcome {
    /// Matched references in input order.
    pub fn resolved_refs(&self) -> Vec<PlatformRef> {
        self.references.iter().flatten().cloned().collect()
    }

    pub fn resolved_count(&self) -> usize {
        self.references.iter().filter(|r| r.is_some()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Completed(ResolveOutcome),
    /// A checkpoint observed the job as cancelled after `processed` tracks.
    Cancelled { processed: usize },
}

enum Tier {
    Native(PlatformRef),
    Lookup,
}

pub struct TrackResolver {
    api: Arc<dyn PlatformApi>,
    client: RateLimitedClient,
    cache: Arc<dyn TrackIdentityCache>,
    config: ExportConfig,
}

impl TrackResolver {
    /// Built by the coordinator, which validates `config` first.
    pub(crate) fn new(
        api: Arc<dyn PlatformApi>,
        client: RateLimitedClient,
        cache: Arc<dyn TrackIdentityCache>,
        config: ExportConfig,
    ) -> Self {
        Self {
            api,
            client,
            cache,
            config,
        }
    }

    fn platform(&self) -> MusicPlatform {
        self.api.platform()
    }

    /// Resolve every track, in order.
    ///
    /// Per-track search failures are soft: the title lands in
    /// `failed_titles` and the loop continues.
    ///
    /// # Errors
    ///
    /// Fatal errors from the rate-limited client (retry exhaustion) and job
    /// store failures abort the run.
    #[instrument(skip_all, fields(job_id = %reporter.job_id(), platform = %self.platform(), tracks = tracks.len()))]
    pub async fn resolve(
        &self,
        tracks: &[TrackRecord],
        token: &AccessToken,
        reporter: &ProgressReporter,
    ) -> Result<Resolution> {
        let platform = self.platform();
        let total = tracks.len();

        let tiers: Vec<Tier> = tracks
            .iter()
            .map(|track| {
                track
                    .native_id(platform)
                    .and_then(|id| self.api.track_ref(id))
                    .map_or(Tier::Lookup, Tier::Native)
            })
            .collect();

        let lookups: Vec<TrackRecord> = tracks
            .iter()
            .zip(&tiers)
            .filter(|(_, tier)| matches!(tier, Tier::Lookup))
            .map(|(track, _)| track.clone())
            .collect();

        let prefetch = if lookups.is_empty() {
            CachePrefetch::default()
        } else {
            match self.cache.prefetch(&lookups, platform).await {
                Ok(prefetch) => prefetch,
                Err(e) => {
                    warn!(error = %e, "Cache prefetch failed, searching every track");
                    CachePrefetch {
                        misses: lookups.len(),
                        ..CachePrefetch::default()
                    }
                }
            }
        };

        let stats = CacheStats {
            hits: prefetch.hits,
            misses: prefetch.misses,
        };
        debug!(hits = stats.hits, misses = stats.misses, "Cache prefetched");

        let mut references = Vec::with_capacity(total);
        let mut failed_titles = Vec::new();
        let mut write_back = Vec::new();
        let mut native = 0usize;
        let mut consecutive_misses = 0usize;

        for (index, (track, tier)) in tracks.iter().zip(tiers).enumerate() {
            let reference = match tier {
                Tier::Native(reference) => {
                    native += 1;
                    consecutive_misses = 0;
                    if let Some(id) = track.native_id(platform) {
                        write_back.push(CacheEntry::new(&track.title, &track.artist, id));
                    }
                    Some(reference)
                }
                Tier::Lookup => match prefetch.lookup(&track.title, &track.artist) {
                    Some(id) => {
                        consecutive_misses = 0;
                        self.api.track_ref(id)
                    }
                    None => {
                        let found = self.search(track, token, reporter).await?;
                        consecutive_misses += 1;
                        if self.config.miss_pacing_threshold > 0
                            && consecutive_misses >= self.config.miss_pacing_threshold
                        {
                            consecutive_misses = 0;
                            pause(self.config.miss_pacing_delay).await;
                        }
                        found.and_then(|id| {
                            let reference = self.api.track_ref(&id);
                            if reference.is_some() {
                                write_back.push(CacheEntry::new(&track.title, &track.artist, id));
                            }
                            reference
                        })
                    }
                },
            };

            if reference.is_none() {
                failed_titles.push(track.title.clone());
            }
            references.push(reference);

            let processed = index + 1;
            if processed % self.config.progress_interval == 0 || processed == total {
                let progress = self.progress_for(processed, total);
                let resolved = u32::try_from(processed - failed_titles.len()).unwrap_or(u32::MAX);
                let failed = u32::try_from(failed_titles.len()).unwrap_or(u32::MAX);
                reporter
                    .report_counts(
                        progress,
                        format!("matching tracks ({}/{})", processed, total),
                        resolved,
                        failed,
                    )
                    .await?;
            }

            if processed % self.config.cancel_check_interval == 0 && reporter.is_cancelled().await? {
                info!(processed, "Cancellation observed during resolution");
                self.spawn_write_back(write_back);
                return Ok(Resolution::Cancelled { processed });
            }
        }

        self.spawn_write_back(write_back);

        let outcome = ResolveOutcome {
            references,
            failed_titles,
            cache_stats: stats,
            native,
        };
        info!(
            resolved = outcome.resolved_count(),
            failed = outcome.failed_titles.len(),
            native,
            hits = stats.hits,
            misses = stats.misses,
            "Resolution finished"
        );
        Ok(Resolution::Completed(outcome))
    }

    /// Search one track. `Ok(None)` covers soft failures.
    async fn search(
        &self,
        track: &TrackRecord,
        token: &AccessToken,
        reporter: &ProgressReporter,
    ) -> Result<Option<String>> {
        let outcome = async {
            let request = self
                .api
                .search_request(token.secret(), &track.title, &track.artist)?;
            let response = self.client.execute(request, reporter).await?;
            if !response.is_success() {
                return Err(ExportError::Platform {
                    status: response.status,
                    message: response.text().unwrap_or_default(),
                });
            }
            self.api
                .parse_search(&response)
                .map_err(|e| ExportError::Parse(e.to_string()))
        }
        .await;

        match outcome {
            Ok(found) => {
                if found.is_none() {
                    debug!(title = %track.title, artist = %track.artist, "No search match");
                }
                Ok(found)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(title = %track.title, artist = %track.artist, error = %e, "Track search failed");
                Ok(None)
            }
        }
    }

    fn progress_for(&self, processed: usize, total: usize) -> u8 {
        let floor = usize::from(self.config.resolve_progress_floor);
        let span = usize::from(self.config.resolve_progress_span);
        let value = floor + processed * span / total.max(1);
        u8::try_from(value.min(100)).unwrap_or(100)
    }

    /// Detached cache write-back. Failures are logged only.
    fn spawn_write_back(&self, entries: Vec<CacheEntry>) {
        if entries.is_empty() {
            return;
        }
        let cache = Arc::clone(&self.cache);
        let platform = self.platform();
        tokio::spawn(async move {
            match cache.write_back(&entries, platform).await {
                Ok(written) => debug!(written, %platform, "Cache write-back finished"),
                Err(e) => warn!(error = %e, %platform, "Cache write-back failed"),
            }
        });
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
