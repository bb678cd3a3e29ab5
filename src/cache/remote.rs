//! Shared Redis cache backend.
//!
//! Endpoint HTML and leaderboards are stored as plain strings with `SETEX`.
//! Prefix deletes walk the keyspace with `SCAN` rather than `KEYS`. Each call
//! works on its own clone of the multiplexed [`ConnectionManager`].

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};
use tracing::debug;

use super::keys::CacheKey;
use super::{CacheError, PostCache};

const SCAN_BATCH: usize = 100;

#[derive(Clone)]
pub struct RedisCache {
    redis: ConnectionManager,
    ttl_secs: u64,
}

impl RedisCache {
    pub fn new(redis: ConnectionManager, ttl: Duration) -> Self {
        Self {
            redis,
            ttl_secs: ttl.as_secs().max(1),
        }
    }

    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(manager, ttl))
    }
}

#[async_trait]
impl PostCache for RedisCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let mut conn = self.redis.clone();
        let value = conn.get::<_, Option<String>>(key.as_str()).await?;
        Ok(value)
    }

    async fn set(&self, key: &CacheKey, value: &str) -> Result<(), CacheError> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key.as_str(), value, self.ttl_secs)
            .await?;
        debug!(key = %key, ttl = self.ttl_secs, "Cache set");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(key.as_str()).await?;
        debug!(key = %key, "Cache delete");
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.redis.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let mut pipe = Pipeline::new();
                for key in &keys {
                    pipe.del(key);
                }
                pipe.query_async::<_, ()>(&mut conn).await?;
                deleted += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, deleted, "Cache prefix delete");
        Ok(deleted)
    }
}

/// Escapes the glob metacharacters `SCAN MATCH` interprets.
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_metacharacters_are_escaped() {
        assert_eq!(escape_glob("/alice/"), "/alice/");
        assert_eq!(escape_glob("/a*b?/"), "/a\\*b\\?/");
        assert_eq!(escape_glob("[x]"), "\\[x\\]");
    }
}
