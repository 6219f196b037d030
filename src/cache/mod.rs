//! In-memory response cache with per-entry TTL.
//!
//! Holds upstream JSON payloads (library lists, item queries, item details)
//! so repeated listings do not hit Jellyfin. Expiry is lazy: an expired entry
//! is treated as absent and removed on the next read. A background sweep
//! ([`start_sweep_task`]) only bounds memory, correctness does not depend on it.
//!
//! Entries written on behalf of an upstream connection carry that
//! connection's generation. Switching servers advances the generation, so a
//! response still in flight from the old server cannot land in the cache.
//!
//! The cache is best-effort. Anything that goes wrong on the read side is a
//! miss, never an error.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Query parameters that only exist to defeat caching and never take part in
/// cache key identity.
pub const CACHE_BUST_PARAMS: &[&str] = &["_t", "bypassCache"];

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// Thread-safe TTL cache keyed by string.
#[derive(Default)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    generation: RwLock<u64>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a live entry.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }

        // Only remove if it is still the expired entry we saw; a concurrent
        // `set` may have replaced it in between.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    /// Get a live entry decoded into `T`. A payload that no longer decodes is
    /// dropped and reported as a miss.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::debug!("Dropping undecodable cache entry {}: {}", key, e);
                self.entries.remove(key);
                None
            }
        }
    }

    /// Store a value, replacing any previous entry for the key.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Serialize and store a value. Serialization failures skip caching.
    pub fn set_from<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl: Duration) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(json) => self.set(key, json, ttl),
            Err(e) => tracing::warn!("Not caching {}: {}", key, e),
        }
    }

    /// Current connection generation.
    pub fn generation(&self) -> u64 {
        *self.generation.read()
    }

    /// Start a new generation and drop every entry.
    ///
    /// Writes tagged with an older generation are refused from here on.
    pub fn advance_generation(&self) -> u64 {
        let mut generation = self.generation.write();
        *generation += 1;
        self.entries.clear();
        *generation
    }

    /// Store a value if `generation` is still current. Returns whether it was
    /// stored.
    pub fn set_in_generation(&self, generation: u64, key: impl Into<String>, value: Value, ttl: Duration) -> bool {
        // Held across the insert so `advance_generation` cannot clear in between.
        let current = self.generation.read();
        if *current != generation {
            return false;
        }
        self.set(key, value, ttl);
        true
    }

    /// Serialize and store a value if `generation` is still current.
    pub fn set_from_in_generation<T: Serialize>(
        &self,
        generation: u64,
        key: impl Into<String>,
        value: &T,
        ttl: Duration,
    ) -> bool {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(json) => self.set_in_generation(generation, key, json, ttl),
            Err(e) => {
                tracing::warn!("Not caching {}: {}", key, e);
                false
            }
        }
    }

    /// Remove an entry. Returns whether one was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry.
    pub fn flush_all(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries and return how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

/// Build a cache key from a prefix and query parameters.
///
/// Parameters are taken in sorted order, and [`CACHE_BUST_PARAMS`] are skipped.
pub fn derive_key(prefix: &str, params: &BTreeMap<String, String>) -> String {
    let mut key = String::from(prefix);
    for (name, value) in params {
        if CACHE_BUST_PARAMS.contains(&name.as_str()) {
            continue;
        }
        key.push('|');
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }
    key
}

/// Spawn a task that periodically sweeps expired entries.
pub fn start_sweep_task(cache: Arc<ResponseCache>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let removed = cache.cleanup_expired();
            if removed > 0 {
                tracing::trace!("Swept {} expired cache entries", removed);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_get_before_ttl_returns_value() {
        let cache = ResponseCache::new();
        cache.set("libraries", json!([{"Name": "Movies"}]), Duration::from_secs(60));

        assert_eq!(cache.get("libraries"), Some(json!([{"Name": "Movies"}])));
    }

    #[test]
    fn test_get_after_ttl_is_absent() {
        let cache = ResponseCache::new();
        cache.set("item:1", json!({"Id": "1"}), Duration::from_millis(20));

        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get("item:1"), None);
        // The expired entry was removed lazily.
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_overwrites() {
        let cache = ResponseCache::new();
        cache.set("k", json!(1), Duration::from_secs(60));
        cache.set("k", json!(2), Duration::from_secs(60));

        assert_eq!(cache.get("k"), Some(json!(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_delete_and_flush() {
        let cache = ResponseCache::new();
        cache.set("a", json!(1), Duration::from_secs(60));
        cache.set("b", json!(2), Duration::from_secs(60));

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.get("a"), None);

        cache.flush_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stale_generation_write_is_refused() {
        let cache = ResponseCache::new();
        let old = cache.generation();
        assert!(cache.set_in_generation(old, "libraries", json!(["old"]), Duration::from_secs(60)));

        let new = cache.advance_generation();
        assert_ne!(old, new);
        assert!(cache.is_empty());

        assert!(!cache.set_from_in_generation(old, "libraries", &json!(["old"]), Duration::from_secs(60)));
        assert_eq!(cache.get("libraries"), None);

        assert!(cache.set_from_in_generation(new, "libraries", &json!(["new"]), Duration::from_secs(60)));
        assert_eq!(cache.get("libraries"), Some(json!(["new"])));
    }

    #[test]
    fn test_flush_keeps_generation() {
        let cache = ResponseCache::new();
        let generation = cache.advance_generation();
        cache.flush_all();
        assert_eq!(cache.generation(), generation);
        assert!(cache.set_in_generation(generation, "k", json!(1), Duration::from_secs(60)));
    }

    #[test]
    fn test_get_as_undecodable_is_miss() {
        let cache = ResponseCache::new();
        cache.set("n", json!("not a number"), Duration::from_secs(60));

        assert_eq!(cache.get_as::<u32>("n"), None);
        assert!(cache.get("n").is_none());
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = ResponseCache::new();
        cache.set("short", json!(1), Duration::from_millis(10));
        cache.set("long", json!(2), Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("long").is_some());
    }

    #[test]
    fn test_derive_key_ignores_cache_busting() {
        let a = derive_key("items", &params(&[("a", "1"), ("_t", "123")]));
        let b = derive_key("items", &params(&[("a", "1"), ("_t", "456")]));
        let c = derive_key("items", &params(&[("a", "1"), ("bypassCache", "true")]));
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_derive_key_distinguishes_filters() {
        let movies = derive_key("items", &params(&[("IncludeItemTypes", "Movie")]));
        let series = derive_key("items", &params(&[("IncludeItemTypes", "Series")]));
        assert_ne!(movies, series);
        assert_ne!(
            derive_key("items", &BTreeMap::new()),
            derive_key("search", &BTreeMap::new())
        );
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired() {
        let cache = Arc::new(ResponseCache::new());
        cache.set("short", json!(1), Duration::from_millis(10));

        let handle = start_sweep_task(cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(cache.is_empty());
        handle.abort();
    }
}
