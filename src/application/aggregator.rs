//! Platform-wide "newest" and "top" leaderboards.
//!
//! Each board lives under its own fixed cache key and is rebuilt from the
//! stores on a miss. Mutations never evict the boards; they age out with the
//! cache TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::analytics::AnalyticsService;
use super::context::RequestContext;
use super::error::PostError;
use super::repos::{AnalyticsStore, ProfileDirectory, RepoError, VersionStore};
use crate::cache::{CacheHandle, CacheKey};
use crate::domain::entities::{VersionRecord, ViewedPostRecord};
use crate::domain::posts::{Owner, PostTitle, VersionNumber};

const METRIC_LEADERBOARD_BUILD_MS: &str = "inkpost_leaderboard_build_ms";

/// Entries per board.
pub const LEADERBOARD_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub owner: String,
    pub title: String,
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub view_count: u64,
    pub picture_url: Option<String>,
}

#[derive(Clone)]
pub struct Aggregator {
    versions: Arc<dyn VersionStore>,
    analytics: Arc<dyn AnalyticsStore>,
    profiles: Arc<dyn ProfileDirectory>,
    ranking: AnalyticsService,
    cache: CacheHandle,
}

impl Aggregator {
    pub fn new(
        versions: Arc<dyn VersionStore>,
        analytics: Arc<dyn AnalyticsStore>,
        profiles: Arc<dyn ProfileDirectory>,
        cache: CacheHandle,
    ) -> Self {
        let ranking = AnalyticsService::new(versions.clone(), analytics.clone());
        Self {
            versions,
            analytics,
            profiles,
            ranking,
            cache,
        }
    }

    /// The most recently created versions, each with its author's picture
    /// and current view count.
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()))]
    pub async fn newest(&self, ctx: &RequestContext) -> Result<Vec<LeaderboardEntry>, PostError> {
        if let Some(entries) = self.cached(ctx, &CacheKey::DiscoverNew).await {
            return Ok(entries);
        }

        let started = Instant::now();
        let records = ctx
            .run(
                "versions.newest",
                self.versions.newest_versions(LEADERBOARD_SIZE),
            )
            .await??;

        let mut pictures = PictureMemo::default();
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let view_count = self.view_count(ctx, &record).await?;
            let picture_url = pictures.get(self, ctx, &record.owner).await;
            entries.push(LeaderboardEntry {
                owner: record.owner,
                title: record.title,
                version: record.version,
                created_at: record.created_at,
                view_count,
                picture_url,
            });
        }

        self.finish(ctx, CacheKey::DiscoverNew, &entries, started).await;
        Ok(entries)
    }

    /// The most-viewed versions that are currently active.
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()))]
    pub async fn top(&self, ctx: &RequestContext) -> Result<Vec<LeaderboardEntry>, PostError> {
        if let Some(entries) = self.cached(ctx, &CacheKey::DiscoverTop).await {
            return Ok(entries);
        }

        let started = Instant::now();
        let ranked: Vec<ViewedPostRecord> =
            self.ranking.most_viewed(ctx, LEADERBOARD_SIZE).await?;

        let mut pictures = PictureMemo::default();
        let mut entries = Vec::with_capacity(ranked.len());
        for record in ranked {
            let picture_url = pictures.get(self, ctx, &record.owner).await;
            entries.push(LeaderboardEntry {
                owner: record.owner,
                title: record.title,
                version: record.version,
                created_at: record.created_at,
                view_count: record.view_count,
                picture_url,
            });
        }

        self.finish(ctx, CacheKey::DiscoverTop, &entries, started).await;
        Ok(entries)
    }

    async fn cached(&self, ctx: &RequestContext, key: &CacheKey) -> Option<Vec<LeaderboardEntry>> {
        let raw = self.cache.lookup(ctx, key).await?;
        match serde_json::from_str(&raw) {
            Ok(entries) => Some(entries),
            Err(err) => {
                warn!(cache_key = %key, error = %err, "Discarding unreadable leaderboard");
                None
            }
        }
    }

    async fn finish(
        &self,
        ctx: &RequestContext,
        key: CacheKey,
        entries: &[LeaderboardEntry],
        started: Instant,
    ) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_LEADERBOARD_BUILD_MS, "board" => key.as_str().to_string()).record(elapsed_ms);
        debug!(cache_key = %key, entries = entries.len(), elapsed_ms, "Rebuilt leaderboard");

        match serde_json::to_string(entries) {
            Ok(serialized) => self.cache.store(ctx, &key, &serialized).await,
            Err(err) => warn!(cache_key = %key, error = %err, "Failed to serialize leaderboard"),
        }
    }

    /// Versions without an analytics record count as unviewed.
    async fn view_count(&self, ctx: &RequestContext, record: &VersionRecord) -> Result<u64, PostError> {
        let Ok(version) = VersionNumber::parse(&record.version) else {
            return Ok(0);
        };
        let owner = Owner::from_stored(record.owner.clone());
        let title = PostTitle::from_stored(record.title.clone());
        match ctx
            .run(
                "analytics.view_count",
                self.analytics.view_count(&owner, &title, version),
            )
            .await?
        {
            Ok(count) => Ok(count),
            Err(RepoError::NotFound) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

/// Owner pictures looked up once per board build.
#[derive(Default)]
struct PictureMemo {
    seen: HashMap<String, Option<String>>,
}

impl PictureMemo {
    async fn get(
        &mut self,
        aggregator: &Aggregator,
        ctx: &RequestContext,
        owner: &str,
    ) -> Option<String> {
        if let Some(picture) = self.seen.get(owner) {
            return picture.clone();
        }

        let stored = Owner::from_stored(owner.to_string());
        let picture = match ctx
            .run("profiles.get", aggregator.profiles.profile(&stored))
            .await
        {
            Ok(Ok(profile)) => profile.and_then(|profile| profile.picture_url),
            Ok(Err(err)) => {
                warn!(owner, error = %err, "Profile lookup failed; omitting picture");
                None
            }
            Err(err) => {
                warn!(owner, error = %err, "Profile lookup timed out; omitting picture");
                None
            }
        };
        self.seen.insert(owner.to_string(), picture.clone());
        picture
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::application::repos::NewVersion;
    use crate::cache::{CacheConfig, MemoryCache};
    use crate::domain::entities::ProfileRecord;
    use crate::infra::memory::{MemoryAnalyticsStore, MemoryProfiles, MemoryVersionStore};

    /// Counts directory lookups.
    struct CountingProfiles {
        inner: MemoryProfiles,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl ProfileDirectory for CountingProfiles {
        async fn profile(&self, owner: &Owner) -> Result<Option<ProfileRecord>, RepoError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.profile(owner).await
        }

        async fn set_style(&self, owner: &Owner, style: &str) -> Result<(), RepoError> {
            self.inner.set_style(owner, style).await
        }
    }

    struct Fixture {
        versions: Arc<MemoryVersionStore>,
        analytics: Arc<MemoryAnalyticsStore>,
        profiles: Arc<CountingProfiles>,
        aggregator: Aggregator,
    }

    fn fixture(cache: CacheHandle) -> Fixture {
        let versions = Arc::new(MemoryVersionStore::new());
        let analytics = Arc::new(MemoryAnalyticsStore::new());
        let profiles = Arc::new(CountingProfiles {
            inner: MemoryProfiles::new(),
            lookups: AtomicUsize::new(0),
        });
        profiles.inner.insert(ProfileRecord {
            username: "alice".into(),
            picture_url: Some("https://img.example/alice.png".into()),
            ..ProfileRecord::default()
        });
        let aggregator = Aggregator::new(
            versions.clone(),
            analytics.clone(),
            profiles.clone(),
            cache,
        );
        Fixture {
            versions,
            analytics,
            profiles,
            aggregator,
        }
    }

    impl Fixture {
        async fn add(&self, owner: &str, title: &str, number: u32, views: usize) {
            self.add_at(owner, title, number, views, OffsetDateTime::now_utc())
                .await;
        }

        async fn add_at(
            &self,
            owner: &str,
            title: &str,
            number: u32,
            views: usize,
            created_at: OffsetDateTime,
        ) {
            let owner = Owner::new(owner).unwrap();
            let title = PostTitle::parse(title).unwrap();
            let version = VersionNumber::new(number).unwrap();
            self.versions
                .insert_active_version(NewVersion {
                    owner: owner.clone(),
                    title: title.clone(),
                    version,
                    created_at,
                    content_ref: String::new(),
                })
                .await
                .unwrap();
            self.analytics
                .create_post_analytics(&owner, &title, version, created_at)
                .await
                .unwrap();
            for _ in 0..views {
                self.analytics
                    .record_view(&owner, &title, version, created_at)
                    .await
                    .unwrap();
            }
        }
    }

    fn memory_cache() -> CacheHandle {
        CacheHandle::new(Arc::new(MemoryCache::new(&CacheConfig::default())))
    }

    #[tokio::test]
    async fn newest_memoizes_pictures_per_owner() {
        let fx = fixture(CacheHandle::disabled());
        fx.add("alice", "One", 1, 3).await;
        fx.add("alice", "Two", 1, 0).await;
        fx.add("bob", "Three", 1, 1).await;

        let board = fx.aggregator.newest(&RequestContext::new()).await.unwrap();
        assert_eq!(board.len(), 3);
        assert_eq!(fx.profiles.lookups.load(Ordering::SeqCst), 2);

        let one = board.iter().find(|entry| entry.title == "One").unwrap();
        assert_eq!(one.view_count, 3);
        assert_eq!(
            one.picture_url.as_deref(),
            Some("https://img.example/alice.png")
        );
        let three = board.iter().find(|entry| entry.title == "Three").unwrap();
        assert_eq!(three.picture_url, None);
    }

    #[tokio::test]
    async fn top_excludes_inactive_versions() {
        let fx = fixture(CacheHandle::disabled());
        fx.add("alice", "Post", 1, 9).await;
        fx.add("alice", "Post", 2, 2).await;

        let board = fx.aggregator.top(&RequestContext::new()).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].version, "2");
        assert_eq!(board[0].view_count, 2);
    }

    #[tokio::test]
    async fn boards_are_not_evicted_by_new_versions() {
        let fx = fixture(memory_cache());
        let ctx = RequestContext::new();
        fx.add("alice", "One", 1, 0).await;

        assert_eq!(fx.aggregator.newest(&ctx).await.unwrap().len(), 1);
        fx.add("alice", "Two", 1, 0).await;
        assert_eq!(fx.aggregator.newest(&ctx).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreadable_cached_board_is_rebuilt() {
        let cache = memory_cache();
        let fx = fixture(cache.clone());
        let ctx = RequestContext::new();
        fx.add("alice", "One", 1, 4).await;
        cache.store(&ctx, &CacheKey::DiscoverTop, "not json").await;

        let board = fx.aggregator.top(&ctx).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].view_count, 4);
    }

    #[tokio::test]
    async fn newest_is_capped_and_ordered_newest_first() {
        let fx = fixture(CacheHandle::disabled());
        let base = OffsetDateTime::now_utc();
        for n in 0..60 {
            fx.add_at(
                "alice",
                &format!("Post {n}"),
                1,
                0,
                base + time::Duration::seconds(n),
            )
            .await;
        }

        let board = fx.aggregator.newest(&RequestContext::new()).await.unwrap();
        assert_eq!(board.len(), LEADERBOARD_SIZE);
        assert_eq!(board[0].title, "Post 59");
        assert_eq!(board[LEADERBOARD_SIZE - 1].title, "Post 10");
        assert!(
            board
                .windows(2)
                .all(|pair| pair[0].created_at > pair[1].created_at)
        );
        assert_eq!(fx.profiles.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn top_is_capped_and_skips_busier_inactive_versions() {
        let fx = fixture(CacheHandle::disabled());
        let base = OffsetDateTime::now_utc();
        for n in 0..60usize {
            let title = format!("Post {n}");
            let created_at = base + time::Duration::seconds(n as i64);
            fx.add_at("alice", &title, 1, 61, created_at).await;
            fx.add_at("alice", &title, 2, n + 1, created_at).await;
        }

        let board = fx.aggregator.top(&RequestContext::new()).await.unwrap();
        assert_eq!(board.len(), LEADERBOARD_SIZE);
        assert!(board.iter().all(|entry| entry.version == "2"));
        assert_eq!(board[0].view_count, 60);
        assert_eq!(board[LEADERBOARD_SIZE - 1].view_count, 11);
        assert!(
            board
                .windows(2)
                .all(|pair| pair[0].view_count > pair[1].view_count)
        );
    }
}
