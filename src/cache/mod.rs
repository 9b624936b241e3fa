//! Response cache for the read side of the file API.
//!
//! - **Keys** ([`CacheKey`]): `cache:` + truncated SHA-256 of request target and caller id
//! - **Store** ([`CacheHandle`]): Redis or in-process memory, or explicitly unavailable
//! - **Middleware** ([`response_cache_layer`]): per-route read-through layer with `X-Cache`
//! - **Trigger** ([`CacheTrigger`]): coarse `cache:*` eviction after mutations
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! redis_url = "redis://127.0.0.1:6379"
//! ttl_seconds = 300
//! op_timeout_ms = 250
//! ```

mod config;
mod keys;
mod lock;
mod memory;
mod middleware;
mod redis_store;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use keys::{
    ANONYMOUS_IDENTITY, CacheKey, INVALIDATION_PATTERN, KEY_NAMESPACE, pattern_matches,
};
pub use memory::MemoryStore;
pub use middleware::{CacheState, X_CACHE, response_cache_layer};
pub use redis_store::RedisStore;
pub use store::{CacheError, CacheHandle, CacheStore, ConnectedStore};
pub use trigger::{CacheTrigger, Mutation};

pub(crate) const METRIC_CACHE_HIT: &str = "smartfile_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "smartfile_cache_miss_total";
pub(crate) const METRIC_CACHE_INVALIDATE: &str = "smartfile_cache_invalidate_total";
pub(crate) const METRIC_CACHE_STORE_ERROR: &str = "smartfile_cache_store_error_total";
