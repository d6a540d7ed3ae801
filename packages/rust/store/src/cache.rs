//! Hash-keyed, TTL-expiring cache for expensive idempotent lookups.
//!
//! Entries expire lazily on read; no proactive sweep runs and no size bound
//! applies, so expired keys are reclaimed only when re-read.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

// ---------------------------------------------------------------------------
// Cache keys
// ---------------------------------------------------------------------------

/// Deterministic cache key over a logical request.
///
/// The query text is normalized (trimmed, lowercased, whitespace-collapsed)
/// so that two callers issuing the same logical request collide on the same
/// entry. Every parameter that affects the result must be passed in `params`.
pub fn cache_key(query: &str, params: &[(&str, &str)]) -> String {
    let normalized = normalize_query(query);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    for (name, value) in params {
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn normalize_query(query: &str) -> String {
    query
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// ResultCache
// ---------------------------------------------------------------------------

struct CacheEntry<V> {
    value: V,
    cached_at: DateTime<Utc>,
}

/// TTL-expiring cache keyed by [`cache_key`] hashes.
pub struct ResultCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a cached value. Entries older than TTL read as misses and are
    /// removed on the spot.
    pub async fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !self.expired(entry) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: reclaim under the write lock, re-checking freshness in
        // case a concurrent put landed in between.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if !self.expired(entry) {
                return Some(entry.value.clone());
            }
            entries.remove(key);
            debug!(key, "evicted expired cache entry");
        }
        None
    }

    pub async fn put(&self, key: String, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                value,
                cached_at: Utc::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    fn expired(&self, entry: &CacheEntry<V>) -> bool {
        match Utc::now().signed_duration_since(entry.cached_at).to_std() {
            Ok(age) => age > self.ttl,
            Err(_) => false,
        }
    }
}
