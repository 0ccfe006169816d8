//! Result cache for transformation outcomes.
//!
//! Repeating an identical transformation request against the same source
//! image should not decode, resample, and re-encode pixels a second time.
//! This module memoizes the *metadata* of a completed pipeline run (not the
//! raw bytes — the derived file is written exactly once per unique key) under
//! a content-derived key with a time-to-live.
//!
//! ## Cache keys
//!
//! Keys are SHA-256 digests over a domain prefix, the source image id, and
//! the [canonical spec form](crate::spec::TransformationSpec::canonicalize).
//! Canonicalization makes the key insensitive to incidental key ordering in
//! the request, so semantically identical requests always collide on the
//! same entry.
//!
//! ## Degradation
//!
//! A cache backend failure must never fail a transformation request. The
//! trait surfaces errors so callers can log them, but the pipeline treats
//! every error as a miss (on read) or a no-op (on write) and recomputes.
//!
//! TTL expiry is advisory: an expired entry behaves as a miss and is dropped
//! lazily on the next lookup — nothing blocks on eviction.

use crate::spec::TransformationSpec;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store for serialized transformation results.
///
/// Values are opaque serialized strings; the pipeline round-trips
/// [`DerivedImageInfo`](crate::record::DerivedImageInfo) through JSON.
/// Implementations are externally synchronized shared stores — writes are
/// idempotent overwrites, and no client-side locking is expected.
pub trait ResultCache: Sync {
    /// Look up an unexpired entry. Expired entries behave as misses.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store an entry, overwriting any previous value under the key.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Drop an entry if present.
    fn invalidate(&self, key: &str) -> Result<(), CacheError>;
}

/// SHA-256 cache key for a `(source image, canonical spec)` pair.
pub fn transform_key(source_id: i64, spec: &TransformationSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"transform\0");
    hasher.update(source_id.to_le_bytes());
    hasher.update(spec.canonicalize().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hit/miss counters for a cache instance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hits, {} misses ({} total)",
            self.hits,
            self.misses,
            self.hits + self.misses
        )
    }
}

/// In-process [`ResultCache`] backed by a mutex-guarded map.
///
/// Suitable for single-process deployments and tests; a networked backend
/// (Redis and friends) slots in behind the same trait.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, StoredEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct StoredEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Number of live (possibly expired) entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for InMemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > Utc::now() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.value.clone()));
            }
            // Expired: drop lazily, report a miss
            entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at: Utc::now() + ttl,
            },
        );
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::spec::Operation;

    /// Mock cache whose backend is always unreachable. Lets pipeline tests
    /// verify that cache unavailability degrades to recompute.
    pub struct UnavailableCache;

    impl ResultCache for UnavailableCache {
        fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        fn invalidate(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    fn resize_spec() -> TransformationSpec {
        TransformationSpec::new(vec![Operation::Resize {
            width: 400,
            height: 300,
        }])
    }

    // =========================================================================
    // Keys
    // =========================================================================

    #[test]
    fn key_is_deterministic() {
        assert_eq!(transform_key(1, &resize_spec()), transform_key(1, &resize_spec()));
    }

    #[test]
    fn key_varies_with_source_image() {
        assert_ne!(transform_key(1, &resize_spec()), transform_key(2, &resize_spec()));
    }

    #[test]
    fn key_varies_with_spec() {
        let other = TransformationSpec::new(vec![Operation::Resize {
            width: 800,
            height: 600,
        }]);
        assert_ne!(transform_key(1, &resize_spec()), transform_key(1, &other));
    }

    #[test]
    fn key_ignores_operation_declaration_order() {
        let crop = Operation::Crop {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
        };
        let resize = Operation::Resize {
            width: 40,
            height: 30,
        };
        let a = TransformationSpec::new(vec![crop.clone(), resize.clone()]);
        let b = TransformationSpec::new(vec![resize, crop]);
        assert_eq!(transform_key(9, &a), transform_key(9, &b));
    }

    #[test]
    fn key_is_hex_sha256() {
        let key = transform_key(1, &resize_spec());
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    // =========================================================================
    // InMemoryCache
    // =========================================================================

    #[test]
    fn set_then_get_roundtrips() {
        let cache = InMemoryCache::new();
        cache.set("k", "payload", Duration::hours(24)).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("payload"));
    }

    #[test]
    fn missing_key_is_a_miss() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("nope").unwrap(), None);
    }

    #[test]
    fn expired_entry_behaves_as_miss() {
        let cache = InMemoryCache::new();
        cache.set("k", "payload", Duration::zero()).unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
        // And the expired entry was dropped
        assert!(cache.is_empty());
    }

    #[test]
    fn set_overwrites_existing_value() {
        let cache = InMemoryCache::new();
        cache.set("k", "old", Duration::hours(1)).unwrap();
        cache.set("k", "new", Duration::hours(1)).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = InMemoryCache::new();
        cache.set("k", "payload", Duration::hours(1)).unwrap();
        cache.invalidate("k").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Duration::hours(1)).unwrap();
        cache.get("k").unwrap();
        cache.get("k").unwrap();
        cache.get("absent").unwrap();
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(format!("{stats}"), "2 hits, 1 misses (3 total)");
    }
}
