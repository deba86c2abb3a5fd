use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::metrics::track_cache_operation;

const DELETE_IF_EQUALS: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// String key/value store with per-key TTL.
///
/// Values are opaque strings; the session layer stores JSON documents and
/// `"1"` sentinels.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomically sets `key` only when it is absent. Returns whether it was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically deletes `key` only while it still holds `expected`.
    /// Returns whether it was deleted.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    async fn ping(&self) -> Result<()>;
}

/// Redis-backed cache shared by every API instance and the write-back worker.
#[derive(Clone)]
pub struct RedisCache {
    redis: ConnectionManager,
}

impl RedisCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.redis.clone();
        track_cache_operation("get", async {
            redis::cmd("GET")
                .arg(key)
                .query_async::<Option<String>>(&mut conn)
                .await
                .with_context(|| format!("Failed to GET {} from Redis", key))
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.redis.clone();
        track_cache_operation("set", async {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async::<()>(&mut conn)
                .await
                .with_context(|| format!("Failed to SET {} in Redis", key))
        })
        .await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.redis.clone();
        track_cache_operation("setnx", async {
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async(&mut conn)
                .await
                .with_context(|| format!("Failed to SET NX {} in Redis", key))?;
            Ok(reply.is_some())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        track_cache_operation("del", async {
            redis::cmd("DEL")
                .arg(key)
                .query_async::<()>(&mut conn)
                .await
                .with_context(|| format!("Failed to DEL {} from Redis", key))
        })
        .await
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.redis.clone();
        track_cache_operation("del_if_equals", async {
            let deleted: i64 = redis::Script::new(DELETE_IF_EQUALS)
                .key(key)
                .arg(expected)
                .invoke_async(&mut conn)
                .await
                .with_context(|| format!("Failed to compare-and-delete {} in Redis", key))?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.redis.clone();
        track_cache_operation("exists", async {
            let count: i64 = redis::cmd("EXISTS")
                .arg(key)
                .query_async(&mut conn)
                .await
                .with_context(|| format!("Failed to check EXISTS {} in Redis", key))?;
            Ok(count > 0)
        })
        .await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.redis.clone();
        let pattern = format!("{}*", prefix);
        track_cache_operation("scan", async {
            let mut keys = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(500)
                    .query_async(&mut conn)
                    .await
                    .with_context(|| format!("Failed to SCAN {} in Redis", pattern))?;
                keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            keys.sort();
            keys.dedup();
            Ok(keys)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Redis PING failed")?;
        Ok(())
    }
}

/// Process-local cache. Used as the same-process cache handle (quiz
/// documents) when no local Redis is configured, and as the shared cache in
/// tests.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, (String, Instant)>) -> T) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        f(&mut entries)
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.with_live_entries(|entries| entries.get(key).map(|(value, _)| value.clone())))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.with_live_entries(|entries| {
            entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        });
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        Ok(self.with_live_entries(|entries| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
            true
        }))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.with_live_entries(|entries| {
            entries.remove(key);
        });
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        Ok(self.with_live_entries(|entries| {
            match entries.get(key) {
                Some((value, _)) if value == expected => {
                    entries.remove(key);
                    true
                }
                _ => false,
            }
        }))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.with_live_entries(|entries| entries.contains_key(key)))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self.with_live_entries(|entries| {
            let mut keys: Vec<String> = entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            keys
        }))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
