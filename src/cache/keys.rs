//! Response cache key derivation.
//!
//! A key is `cache:` followed by the hex encoding of the first 128 bits of
//! `SHA-256("{path}:user:{identity}")`. The derivation carries no per-process
//! salt, so keys survive restarts and are shared between replicas.

use std::fmt;

use sha2::{Digest, Sha256};

/// Namespace prefix carried by every derived key.
pub const KEY_NAMESPACE: &str = "cache:";

/// Pattern matching every key [`CacheKey::derive`] can produce.
pub const INVALIDATION_PATTERN: &str = "cache:*";

/// Identity used for requests without an authenticated user.
///
/// Real user ids are assigned by the database starting at 1.
pub const ANONYMOUS_IDENTITY: i64 = 0;

const DIGEST_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a request target and the caller identity.
    ///
    /// `target` is the path including any query string, so paginated or
    /// filtered reads of the same path are cached independently.
    pub fn derive(target: &str, identity: Option<i64>) -> Self {
        let identity = identity.unwrap_or(ANONYMOUS_IDENTITY);
        let material = format!("{target}:user:{identity}");

        let mut hasher = Sha256::new();
        hasher.update(material.as_bytes());
        let digest = hasher.finalize();

        Self(format!("{KEY_NAMESPACE}{}", hex::encode(&digest[..DIGEST_BYTES])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Glob match supporting `*` (any run) and `?` (any single byte), the subset
/// of Redis `MATCH` syntax used for invalidation.
pub fn pattern_matches(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.as_bytes();
    let candidate = candidate.as_bytes();

    let (mut p, mut c) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while c < candidate.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == candidate[c]) {
            p += 1;
            c += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            resume = c;
            p += 1;
        } else if let Some(star_at) = star {
            p = star_at + 1;
            resume += 1;
            c = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|byte| *byte == b'*')
}
