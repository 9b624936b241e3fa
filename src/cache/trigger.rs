//! Cache invalidation trigger.
//!
//! Mutating file operations call into [`CacheTrigger`] after their write
//! has committed. Eviction is deliberately coarse: every key under the
//! response-cache namespace is removed, whoever it belongs to.

use std::fmt;

use tracing::{debug, warn};

use super::{
    METRIC_CACHE_INVALIDATE, METRIC_CACHE_STORE_ERROR,
    keys::INVALIDATION_PATTERN,
    store::{CacheError, CacheHandle},
};

/// The committed write that prompted an invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Uploaded { file_id: i64 },
    Deleted { file_id: i64 },
    Restored { file_id: i64 },
    Purged { file_id: i64 },
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Uploaded { .. } => "upload",
            Mutation::Deleted { .. } => "delete",
            Mutation::Restored { .. } => "restore",
            Mutation::Purged { .. } => "purge",
        }
    }

    pub fn file_id(&self) -> i64 {
        match *self {
            Mutation::Uploaded { file_id }
            | Mutation::Deleted { file_id }
            | Mutation::Restored { file_id }
            | Mutation::Purged { file_id } => file_id,
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of file {}", self.kind(), self.file_id())
    }
}

#[derive(Clone, Debug)]
pub struct CacheTrigger {
    handle: CacheHandle,
}

impl CacheTrigger {
    pub fn new(handle: CacheHandle) -> Self {
        Self { handle }
    }

    /// Evict every response-cache entry, returning how many were removed.
    ///
    /// An unavailable store is a successful no-op.
    pub async fn invalidate(&self) -> Result<u64, CacheError> {
        if !self.handle.is_available() {
            debug!("Cache invalidation skipped: store unavailable");
            return Ok(0);
        }
        self.handle.delete_matching(INVALIDATION_PATTERN).await
    }

    /// Invalidate after a committed mutation.
    ///
    /// The mutation is never rolled back; a failed eviction is logged as a
    /// post-commit warning and the stale entries age out with their TTL.
    pub async fn after_mutation(&self, mutation: Mutation) {
        match self.invalidate().await {
            Ok(removed) => {
                metrics::counter!(METRIC_CACHE_INVALIDATE, "mutation" => mutation.kind())
                    .increment(1);
                debug!(
                    mutation = mutation.kind(),
                    file_id = mutation.file_id(),
                    removed,
                    "Response cache invalidated"
                );
            }
            Err(err) => {
                metrics::counter!(METRIC_CACHE_STORE_ERROR, "op" => "invalidate").increment(1);
                warn!(
                    target = "smartfile::cache::trigger",
                    mutation = mutation.kind(),
                    file_id = mutation.file_id(),
                    error = %err,
                    "Post-commit cache invalidation failed; entries expire with their TTL"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::cache::{CacheConfig, CacheKey, store::testing::BrokenStore};

    async fn seeded_handle() -> CacheHandle {
        let handle = CacheHandle::memory(&CacheConfig::default());
        for (path, user) in [("/api/files/", 1), ("/api/files/", 2), ("/api/files/deleted", 1)] {
            let key = CacheKey::derive(path, Some(user));
            handle
                .set(key.as_str(), Bytes::from_static(b"{}"), Duration::from_secs(60))
                .await
                .unwrap();
        }
        handle
            .set("session:keep", Bytes::from_static(b"1"), Duration::from_secs(60))
            .await
            .unwrap();
        handle
    }

    #[tokio::test]
    async fn invalidate_clears_every_users_entries() {
        let handle = seeded_handle().await;
        let trigger = CacheTrigger::new(handle.clone());

        assert_eq!(trigger.invalidate().await.unwrap(), 3);
        assert_eq!(handle.count_matching(INVALIDATION_PATTERN).await.unwrap(), 0);
        assert!(handle.get("session:keep").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unavailable_store_is_a_successful_no_op() {
        let trigger = CacheTrigger::new(CacheHandle::Unavailable);
        assert_eq!(trigger.invalidate().await.unwrap(), 0);
        trigger.after_mutation(Mutation::Uploaded { file_id: 1 }).await;
    }

    #[tokio::test]
    async fn enumeration_failure_is_surfaced_once() {
        let handle = CacheHandle::new(Arc::new(BrokenStore), Duration::from_millis(50));
        let trigger = CacheTrigger::new(handle);

        let err = trigger.invalidate().await.unwrap_err();
        assert!(matches!(err, CacheError::Enumeration { .. }));

        // swallowed on the mutation path
        trigger.after_mutation(Mutation::Purged { file_id: 9 }).await;
    }

    #[test]
    fn mutation_labels() {
        let mutation = Mutation::Restored { file_id: 4 };
        assert_eq!(mutation.kind(), "restore");
        assert_eq!(mutation.to_string(), "restore of file 4");
    }
}
