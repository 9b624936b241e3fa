//! Cache configuration.
//!
//! Controls the response cache backend and its bounds via `[cache]` in `smartfile.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_TTL_SECONDS: u64 = 300;
const DEFAULT_OP_TIMEOUT_MS: u64 = 250;
const DEFAULT_MEMORY_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Master switch; when off the cache handle is always unavailable.
    pub enabled: bool,
    /// Redis endpoint. Without one the in-process store is used.
    pub redis_url: Option<String>,
    /// Lifetime of every cached response.
    pub ttl: Duration,
    /// Upper bound for a single store operation.
    pub op_timeout: Duration,
    /// Entry limit of the in-process store.
    pub memory_capacity: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: None,
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            op_timeout: Duration::from_millis(DEFAULT_OP_TIMEOUT_MS),
            memory_capacity: NonZeroUsize::new(DEFAULT_MEMORY_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            redis_url: settings.redis_url.clone(),
            ttl: Duration::from_secs(settings.ttl_seconds.get()),
            op_timeout: Duration::from_millis(settings.op_timeout_ms.get()),
            memory_capacity: settings.memory_capacity,
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.is_enabled());
        assert!(config.redis_url.is_none());
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.op_timeout, Duration::from_millis(250));
        assert_eq!(config.memory_capacity.get(), 1024);
    }
}
