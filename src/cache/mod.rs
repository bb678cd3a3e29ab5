//! Shared endpoint cache.
//!
//! Holds rendered HTML keyed by endpoint path plus the two serialized
//! leaderboards. Entries are never authoritative: every failure here is
//! logged, counted and treated as a miss by [`CacheHandle`].
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "redis"        # or "memory"
//! redis_url = "redis://127.0.0.1:6379"
//! ttl_seconds = 1200
//! memory_capacity = 1024
//! ```

mod config;
mod keys;
mod remote;
mod store;

pub use config::{CacheBackend, CacheConfig};
pub use keys::CacheKey;
pub use remote::RedisCache;
pub use store::MemoryCache;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::context::RequestContext;

const METRIC_CACHE_HIT: &str = "inkpost_cache_hit_total";
const METRIC_CACHE_MISS: &str = "inkpost_cache_miss_total";
const METRIC_CACHE_ERROR: &str = "inkpost_cache_error_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key-value cache with a fixed per-entry TTL chosen by the backend.
#[async_trait]
pub trait PostCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &CacheKey, value: &str) -> Result<(), CacheError>;

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Removes every entry whose key starts with `prefix`; returns how many.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Backend used when caching is turned off: reads miss, writes are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCache;

#[async_trait]
impl PostCache for DisabledCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &CacheKey, _value: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &CacheKey) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<usize, CacheError> {
        Ok(0)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Builds the configured backend. An unreachable Redis degrades to
/// [`DisabledCache`] so serving keeps working without a cache.
pub async fn build_cache(config: &CacheConfig) -> Arc<dyn PostCache> {
    if !config.enabled {
        debug!("Cache disabled by configuration");
        return Arc::new(DisabledCache);
    }

    match config.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new(config)),
        CacheBackend::Redis => {
            let Some(url) = config.redis_url.as_deref() else {
                warn!("Redis cache selected without a URL; caching disabled");
                return Arc::new(DisabledCache);
            };
            match RedisCache::connect(url, config.ttl()).await {
                Ok(cache) => Arc::new(cache),
                Err(err) => {
                    warn!(error = %err, "Redis unreachable; caching disabled");
                    Arc::new(DisabledCache)
                }
            }
        }
    }
}

/// Deadline for evictions, which run after the store has committed and must
/// not be starved by whatever the request has left.
pub const INVALIDATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Best-effort front for a [`PostCache`].
///
/// Reads and writes share the request deadline; evictions get their own
/// [`INVALIDATION_TIMEOUT`]. Errors and timeouts are logged and counted,
/// reads degrade to misses and writes are skipped.
#[derive(Clone)]
pub struct CacheHandle {
    inner: Arc<dyn PostCache>,
}

impl CacheHandle {
    pub fn new(inner: Arc<dyn PostCache>) -> Self {
        Self { inner }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledCache))
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    pub async fn lookup(&self, ctx: &RequestContext, key: &CacheKey) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        match ctx.run("cache.get", self.inner.get(key)).await {
            Ok(Ok(Some(value))) => {
                counter!(METRIC_CACHE_HIT, "kind" => key.kind()).increment(1);
                Some(value)
            }
            Ok(Ok(None)) => {
                counter!(METRIC_CACHE_MISS, "kind" => key.kind()).increment(1);
                None
            }
            Ok(Err(err)) => {
                record_failure("get", key.as_str(), &err);
                None
            }
            Err(err) => {
                record_failure("get", key.as_str(), &err);
                None
            }
        }
    }

    pub async fn store(&self, ctx: &RequestContext, key: &CacheKey, value: &str) {
        if !self.is_enabled() {
            return;
        }
        match ctx.run("cache.set", self.inner.set(key, value)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => record_failure("set", key.as_str(), &err),
            Err(err) => record_failure("set", key.as_str(), &err),
        }
    }

    pub async fn invalidate(&self, ctx: &RequestContext, key: &CacheKey) {
        if !self.is_enabled() {
            return;
        }
        let ctx = ctx.follow_up(INVALIDATION_TIMEOUT);
        match ctx.run("cache.delete", self.inner.delete(key)).await {
            Ok(Ok(())) => debug!(key = %key, "Cache entry invalidated"),
            Ok(Err(err)) => record_failure("delete", key.as_str(), &err),
            Err(err) => record_failure("delete", key.as_str(), &err),
        }
    }

    pub async fn invalidate_prefix(&self, ctx: &RequestContext, prefix: &str) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        let ctx = ctx.follow_up(INVALIDATION_TIMEOUT);
        match ctx
            .run("cache.delete_prefix", self.inner.delete_prefix(prefix))
            .await
        {
            Ok(Ok(removed)) => {
                debug!(prefix, removed, "Cache prefix invalidated");
                removed
            }
            Ok(Err(err)) => {
                record_failure("delete_prefix", prefix, &err);
                0
            }
            Err(err) => {
                record_failure("delete_prefix", prefix, &err);
                0
            }
        }
    }
}

fn record_failure(op: &'static str, key: &str, err: &dyn std::error::Error) {
    warn!(op, key, error = %err, "Cache operation failed; continuing without cache");
    counter!(METRIC_CACHE_ERROR, "op" => op).increment(1);
}
