//! Redis-backed cache store.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::warn;

use super::store::{CacheError, CacheStore};

const SCAN_BATCH: u64 = 100;

/// Cache store over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }

    async fn scan_page(
        &self,
        cursor: u64,
        pattern: &str,
    ) -> Result<(u64, Vec<String>), redis::RedisError> {
        let mut conn = self.manager.clone();
        redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(&mut conn)
            .await
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value.filter(|raw| !raw.is_empty()).map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let _: () = conn.pset_ex(key, value.as_ref(), millis).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    /// Walk the keyspace with `SCAN` and delete each page of matches.
    ///
    /// A failed `DEL` does not stop the walk; the first such failure is
    /// reported once the walk finishes. A failed `SCAN` ends the walk.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut cursor = 0u64;
        let mut removed = 0u64;
        let mut first_failure: Option<redis::RedisError> = None;

        loop {
            let (next, keys) = match self.scan_page(cursor, pattern).await {
                Ok(page) => page,
                Err(err) => {
                    return Err(CacheError::enumeration(pattern, removed, err.into()));
                }
            };

            if !keys.is_empty() {
                let mut conn = self.manager.clone();
                let deleted: Result<u64, _> = conn.del(&keys).await;
                match deleted {
                    Ok(count) => removed += count,
                    Err(err) => {
                        warn!(
                            target = "smartfile::cache::redis_store",
                            pattern,
                            batch = keys.len(),
                            error = %err,
                            "Failed to delete matched cache keys"
                        );
                        first_failure.get_or_insert(err);
                    }
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        match first_failure {
            Some(err) => Err(CacheError::enumeration(pattern, removed, err.into())),
            None => Ok(removed),
        }
    }

    async fn count_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut cursor = 0u64;
        let mut count = 0u64;
        loop {
            let (next, keys) = self.scan_page(cursor, pattern).await?;
            count += keys.len() as u64;
            cursor = next;
            if cursor == 0 {
                return Ok(count);
            }
        }
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
