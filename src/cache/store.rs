//! Cache store abstraction and the injected handle around it.
//!
//! [`CacheHandle`] is what the rest of the crate holds. Its
//! [`CacheHandle::Unavailable`] variant turns every operation into a no-op,
//! and every call on an available store is bounded by the configured
//! operation timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use super::config::CacheConfig;
use super::memory::MemoryStore;
use super::redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store is unavailable")]
    Unavailable,
    #[error("cache operation `{op}` timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
    #[error("cache backend error: {0}")]
    Backend(#[from] redis::RedisError),
    #[error("pattern eviction of `{pattern}` stopped after {removed} entries: {source}")]
    Enumeration {
        pattern: String,
        removed: u64,
        #[source]
        source: Box<CacheError>,
    },
}

impl CacheError {
    pub fn enumeration(pattern: &str, removed: u64, source: CacheError) -> Self {
        Self::Enumeration {
            pattern: pattern.to_string(),
            removed,
            source: Box::new(source),
        }
    }
}

/// Key-value collaborator backing the response cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend label used in logs and diagnostics.
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Remove one key, reporting whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every key matching a glob pattern and return how many were removed.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError>;

    async fn count_matching(&self, pattern: &str) -> Result<u64, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

#[derive(Clone)]
pub struct ConnectedStore {
    store: Arc<dyn CacheStore>,
    op_timeout: Duration,
}

impl ConnectedStore {
    async fn bounded<T, F>(&self, op: &'static str, future: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        match tokio::time::timeout(self.op_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                op,
                timeout_ms: u64::try_from(self.op_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

/// Handle to the cache store as seen by request handlers and services.
#[derive(Clone)]
pub enum CacheHandle {
    Available(ConnectedStore),
    Unavailable,
}

impl CacheHandle {
    pub fn new(store: Arc<dyn CacheStore>, op_timeout: Duration) -> Self {
        Self::Available(ConnectedStore { store, op_timeout })
    }

    /// In-process store sized and bounded by `config`.
    pub fn memory(config: &CacheConfig) -> Self {
        Self::new(
            Arc::new(MemoryStore::new(config.memory_capacity)),
            config.op_timeout,
        )
    }

    /// Build the handle described by configuration.
    ///
    /// A Redis endpoint that cannot be reached (or does not answer `PING`
    /// within the operation timeout) yields [`CacheHandle::Unavailable`];
    /// the service then runs uncached instead of failing to start.
    pub async fn connect(config: &CacheConfig) -> Self {
        if !config.is_enabled() {
            info!(
                target = "smartfile::cache::store",
                "Response cache disabled by configuration"
            );
            return Self::Unavailable;
        }

        let Some(url) = config.redis_url.as_deref() else {
            info!(
                target = "smartfile::cache::store",
                capacity = config.memory_capacity.get(),
                "Using in-process response cache"
            );
            return Self::memory(config);
        };

        let connected = match tokio::time::timeout(config.op_timeout * 8, RedisStore::connect(url))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                op: "connect",
                timeout_ms: u64::try_from((config.op_timeout * 8).as_millis())
                    .unwrap_or(u64::MAX),
            }),
        };

        let handle = match connected {
            Ok(store) => Self::new(Arc::new(store), config.op_timeout),
            Err(err) => {
                warn!(
                    target = "smartfile::cache::store",
                    error = %err,
                    "Redis unreachable; response cache disabled"
                );
                return Self::Unavailable;
            }
        };

        match handle.ping().await {
            Ok(()) => {
                info!(
                    target = "smartfile::cache::store",
                    backend = "redis",
                    "Connected to response cache store"
                );
                handle
            }
            Err(err) => {
                warn!(
                    target = "smartfile::cache::store",
                    error = %err,
                    "Redis did not answer PING; response cache disabled"
                );
                Self::Unavailable
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Self::Available(connected) => connected.store.backend(),
            Self::Unavailable => "unavailable",
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        match self {
            Self::Available(connected) => {
                connected.bounded("get", connected.store.get(key)).await
            }
            Self::Unavailable => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        match self {
            Self::Available(connected) => {
                connected
                    .bounded("set", connected.store.set(key, value, ttl))
                    .await
            }
            Self::Unavailable => Ok(()),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match self {
            Self::Available(connected) => {
                connected.bounded("delete", connected.store.delete(key)).await
            }
            Self::Unavailable => Ok(false),
        }
    }

    pub async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        match self {
            Self::Available(connected) => {
                connected
                    .bounded("delete_matching", connected.store.delete_matching(pattern))
                    .await
            }
            Self::Unavailable => Ok(0),
        }
    }

    pub async fn count_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        match self {
            Self::Available(connected) => {
                connected
                    .bounded("count_matching", connected.store.count_matching(pattern))
                    .await
            }
            Self::Unavailable => Ok(0),
        }
    }

    /// Liveness probe. Unlike the data operations this reports
    /// [`CacheError::Unavailable`] instead of succeeding silently.
    pub async fn ping(&self) -> Result<(), CacheError> {
        match self {
            Self::Available(connected) => connected.bounded("ping", connected.store.ping()).await,
            Self::Unavailable => Err(CacheError::Unavailable),
        }
    }
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(connected) => f
                .debug_struct("Available")
                .field("backend", &connected.store.backend())
                .field("op_timeout", &connected.op_timeout)
                .finish(),
            Self::Unavailable => f.write_str("Unavailable"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{BrokenStore, StalledStore};
    use super::*;

    #[tokio::test]
    async fn unavailable_handle_is_a_no_op() {
        let handle = CacheHandle::Unavailable;

        assert!(!handle.is_available());
        assert!(handle.get("cache:abc").await.unwrap().is_none());
        handle
            .set("cache:abc", Bytes::from_static(b"{}"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!handle.delete("cache:abc").await.unwrap());
        assert_eq!(handle.delete_matching("cache:*").await.unwrap(), 0);
        assert_eq!(handle.count_matching("cache:*").await.unwrap(), 0);
        assert!(matches!(handle.ping().await, Err(CacheError::Unavailable)));
    }

    #[tokio::test]
    async fn slow_store_operations_time_out() {
        let handle = CacheHandle::new(Arc::new(StalledStore), Duration::from_millis(20));

        let err = handle.get("cache:abc").await.unwrap_err();
        assert!(matches!(err, CacheError::Timeout { op: "get", .. }));

        let err = handle.delete_matching("cache:*").await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::Timeout {
                op: "delete_matching",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn backend_errors_surface_from_available_handle() {
        let handle = CacheHandle::new(Arc::new(BrokenStore), Duration::from_millis(50));

        assert!(matches!(
            handle.get("cache:abc").await,
            Err(CacheError::Backend(_))
        ));
        assert!(matches!(
            handle.delete_matching("cache:*").await,
            Err(CacheError::Enumeration { removed: 0, .. })
        ));
    }

    #[tokio::test]
    async fn disabled_config_connects_to_unavailable() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let handle = CacheHandle::connect(&config).await;
        assert!(!handle.is_available());
        assert_eq!(handle.backend(), "unavailable");
    }

    #[tokio::test]
    async fn missing_redis_url_falls_back_to_memory() {
        let handle = CacheHandle::connect(&CacheConfig::default()).await;
        assert!(handle.is_available());
        assert_eq!(handle.backend(), "memory");
        handle.ping().await.unwrap();
    }
}
