//! TTL Cache
//!
//! Generic expiring key/value store with two tiers: a fast in-memory map
//! and the durable store's cache table. Durable hits are promoted to
//! memory. Per-class TTLs; `cleanup()` sweeps expired entries from both
//! tiers without blocking unrelated gets.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logic::store::SqliteStore;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL seconds per cache class
    pub class_ttls: HashMap<String, i64>,
    /// Fallback TTL for unknown classes
    pub default_ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut class_ttls = HashMap::new();
        class_ttls.insert("link_scan".to_string(), 3600);
        class_ttls.insert("actor_profile".to_string(), 1800);
        class_ttls.insert("group_settings".to_string(), 300);
        Self {
            class_ttls,
            default_ttl_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl_for(&self, class: &str) -> i64 {
        self.class_ttls
            .get(class)
            .copied()
            .unwrap_or(self.default_ttl_secs)
    }
}

// ============================================================================
// CACHE
// ============================================================================

#[derive(Debug, Clone)]
struct MemEntry {
    value: Value,
    cached_at: DateTime<Utc>,
}

/// Two-tier expiring key/value cache.
pub struct TtlCache {
    memory: RwLock<HashMap<(String, String), MemEntry>>,
    store: Option<Arc<SqliteStore>>,
    config: CacheConfig,
}

impl TtlCache {
    pub fn new(store: Option<Arc<SqliteStore>>, config: CacheConfig) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            store,
            config,
        }
    }

    /// Look up a value; expired entries are treated as misses.
    pub fn get(&self, class: &str, key: &str) -> Option<Value> {
        self.get_at(class, key, Utc::now())
    }

    /// Time-injected lookup (the public `get` passes the current instant).
    pub fn get_at(&self, class: &str, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let ttl = self.config.ttl_for(class);
        let map_key = (class.to_string(), key.to_string());

        {
            let memory = self.memory.read();
            if let Some(entry) = memory.get(&map_key) {
                if !expired(entry.cached_at, ttl, now) {
                    return Some(entry.value.clone());
                }
            }
        }

        // Durable tier; promote on hit
        let store = self.store.as_ref()?;
        match store.cache_get(class, key) {
            Ok(Some((raw, cached_at))) if !expired(cached_at, ttl, now) => {
                match serde_json::from_str::<Value>(&raw) {
                    Ok(value) => {
                        self.memory
                            .write()
                            .insert(map_key, MemEntry { value: value.clone(), cached_at });
                        Some(value)
                    }
                    Err(e) => {
                        log::warn!("cache entry {}/{} is not valid json: {}", class, key, e);
                        None
                    }
                }
            }
            Ok(_) => None,
            Err(e) => {
                log::warn!("durable cache read failed for {}/{}: {}", class, key, e);
                None
            }
        }
    }

    /// Store a value in both tiers.
    pub fn set(&self, class: &str, key: &str, value: Value) {
        self.set_at(class, key, value, Utc::now());
    }

    pub fn set_at(&self, class: &str, key: &str, value: Value, now: DateTime<Utc>) {
        let raw = value.to_string();
        self.memory.write().insert(
            (class.to_string(), key.to_string()),
            MemEntry {
                value,
                cached_at: now,
            },
        );
        if let Some(store) = &self.store {
            if let Err(e) = store.cache_put(class, key, &raw, now) {
                log::warn!("durable cache write failed for {}/{}: {}", class, key, e);
            }
        }
    }

    /// Periodic sweep of expired entries from both tiers. Holds the map
    /// lock only for the in-memory pass; store I/O runs outside it.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let mut removed;
        let classes: Vec<String>;
        {
            let mut memory = self.memory.write();
            let before = memory.len();
            memory.retain(|(class, _), entry| {
                !expired(entry.cached_at, self.config.ttl_for(class), now)
            });
            removed = before - memory.len();
            classes = self.config.class_ttls.keys().cloned().collect();
        }

        if let Some(store) = &self.store {
            for class in classes {
                let ttl = self.config.ttl_for(&class);
                let cutoff = now - Duration::seconds(ttl);
                match store.cache_evict_before(&class, cutoff) {
                    Ok(n) => removed += n,
                    Err(e) => log::warn!("durable cache sweep failed for {}: {}", class, e),
                }
            }
        }

        if removed > 0 {
            log::debug!("cache cleanup removed {} expired entries", removed);
        }
        removed
    }

    pub fn memory_len(&self) -> usize {
        self.memory.read().len()
    }
}

fn expired(cached_at: DateTime<Utc>, ttl_secs: i64, now: DateTime<Utc>) -> bool {
    (now - cached_at).num_seconds() > ttl_secs
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ttl_boundary() {
        let cache = TtlCache::new(None, CacheConfig::default());
        let t0 = Utc::now();
        cache.set_at("link_scan", "k", json!({"v": 1}), t0);

        // Inside the TTL, including the boundary second
        assert!(cache.get_at("link_scan", "k", t0 + Duration::seconds(3600)).is_some());
        // One past the TTL is a miss
        assert!(cache.get_at("link_scan", "k", t0 + Duration::seconds(3601)).is_none());
    }

    #[test]
    fn test_per_class_ttls() {
        let cache = TtlCache::new(None, CacheConfig::default());
        let t0 = Utc::now();
        cache.set_at("group_settings", "g", json!(1), t0);
        cache.set_at("link_scan", "l", json!(2), t0);

        let later = t0 + Duration::seconds(600);
        assert!(cache.get_at("group_settings", "g", later).is_none());
        assert!(cache.get_at("link_scan", "l", later).is_some());
    }

    #[test]
    fn test_durable_promotion() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let t0 = Utc::now();
        store.cache_put("link_scan", "k", "{\"v\":7}", t0).unwrap();

        let cache = TtlCache::new(Some(store), CacheConfig::default());
        assert_eq!(cache.memory_len(), 0);

        let hit = cache.get_at("link_scan", "k", t0).unwrap();
        assert_eq!(hit["v"], 7);
        // Promoted to memory
        assert_eq!(cache.memory_len(), 1);
    }

    #[test]
    fn test_cleanup_sweeps_both_tiers() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let cache = TtlCache::new(Some(store.clone()), CacheConfig::default());
        let t0 = Utc::now();

        cache.set_at("link_scan", "old", json!(1), t0 - Duration::seconds(7200));
        cache.set_at("link_scan", "fresh", json!(2), t0);

        let removed = cache.cleanup_at(t0);
        assert!(removed >= 2); // memory + durable row for "old"
        assert!(cache.get_at("link_scan", "fresh", t0).is_some());
        assert!(store.cache_get("link_scan", "old").unwrap().is_none());
    }
}
