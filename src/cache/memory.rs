//! In-process cache store.
//!
//! Entries live in a capacity-bounded LRU and carry an absolute expiry; an
//! expired entry is treated as absent and dropped on the next access.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;

use super::keys::pattern_matches;
use super::lock::mutex_lock;
use super::store::{CacheError, CacheStore};

const SOURCE: &str = "smartfile::cache::memory";

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Bytes,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

pub struct MemoryStore {
    entries: Mutex<LruCache<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");

        let live = entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());

        if live.is_none() {
            entries.pop(key);
        }

        Ok(live.filter(|value| !value.is_empty()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let entry = MemoryEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        mutex_lock(&self.entries, SOURCE, "set").put(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(mutex_lock(&self.entries, SOURCE, "delete")
            .pop(key)
            .is_some())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "delete_matching");

        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| pattern_matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0u64;
        for key in doomed {
            if entries.pop(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn count_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let now = Instant::now();
        let entries = mutex_lock(&self.entries, SOURCE, "count_matching");
        let count = entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && pattern_matches(pattern, key))
            .count();
        Ok(count as u64)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
