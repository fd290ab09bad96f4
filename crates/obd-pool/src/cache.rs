//! Bounded LRU+TTL cache
//!
//! Sits beside the driver to absorb repeated reads: DTC descriptions
//! barely ever change, and live PID samples are worth keeping for a
//! minute at most. Two eviction triggers: LRU once the map is full, and
//! TTL expiry observed lazily on the next access.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Cache tuning
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size: usize,
    /// Default entry lifetime; `insert_with_ttl` overrides per entry
    pub ttl: Duration,
}

/// Hit/miss/eviction counters; TTL expiry counts as an eviction
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    last_accessed_at: Instant,
}

struct CacheInner<K, V> {
    map: HashMap<K, CacheEntry<V>>,
    /// Recency order, least recently used at the front
    order: VecDeque<K>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Generic bounded key/value store with LRU and TTL eviction.
///
/// Recency is updated on both `get` hits and `insert`. All mutation is
/// serialized behind one mutex; lock hold times are bounded by the LRU
/// bookkeeping, never by I/O.
pub struct ObdCache<K, V> {
    config: CacheConfig,
    inner: Mutex<CacheInner<K, V>>,
}

impl<K, V> ObdCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let expired = match inner.map.get(key) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(entry) => now > entry.expires_at,
        };
        if expired {
            inner.map.remove(key);
            inner.order.retain(|k| k != key);
            inner.evictions += 1;
            inner.misses += 1;
            return None;
        }
        inner.hits += 1;
        let entry = inner.map.get_mut(key).map(|entry| {
            entry.last_accessed_at = now;
            entry.value.clone()
        });
        touch(&mut inner.order, key);
        entry
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.config.ttl);
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        if inner.map.contains_key(&key) {
            touch(&mut inner.order, &key);
        } else {
            if inner.map.len() >= self.config.max_size {
                if let Some(lru) = inner.order.pop_front() {
                    inner.map.remove(&lru);
                    inner.evictions += 1;
                }
            }
            inner.order.push_back(key.clone());
        }
        inner.map.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
                last_accessed_at: now,
            },
        );
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let removed = inner.map.remove(key).map(|entry| entry.value);
        if removed.is_some() {
            inner.order.retain(|k| k != key);
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            len: inner.map.len(),
        }
    }
}

fn touch<K: Eq>(order: &mut VecDeque<K>, key: &K) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        if let Some(k) = order.remove(pos) {
            order.push_back(k);
        }
    }
}

/// DTC code → human-readable description
pub struct DtcDescriptionCache {
    cache: ObdCache<String, String>,
}

impl DtcDescriptionCache {
    pub const DEFAULT_MAX_SIZE: usize = 5_000;
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new() -> Self {
        Self::with_config(CacheConfig {
            max_size: Self::DEFAULT_MAX_SIZE,
            ttl: Self::DEFAULT_TTL,
        })
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            cache: ObdCache::new(config),
        }
    }

    pub fn get(&self, code: &str) -> Option<String> {
        self.cache.get(&code.to_string())
    }

    pub fn insert(&self, code: &str, description: &str) {
        self.cache.insert(code.to_string(), description.to_string());
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Default for DtcDescriptionCache {
    fn default() -> Self {
        Self::new()
    }
}

/// `(pid, vehicle)` → last sampled value, isolating samples per vehicle
pub struct PidSampleCache {
    cache: ObdCache<(String, String), f64>,
}

impl PidSampleCache {
    pub const DEFAULT_MAX_SIZE: usize = 1_000;
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    pub fn new() -> Self {
        Self::with_config(CacheConfig {
            max_size: Self::DEFAULT_MAX_SIZE,
            ttl: Self::DEFAULT_TTL,
        })
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            cache: ObdCache::new(config),
        }
    }

    pub fn get(&self, pid: &str, vehicle_id: &str) -> Option<f64> {
        self.cache.get(&(pid.to_string(), vehicle_id.to_string()))
    }

    pub fn insert(&self, pid: &str, vehicle_id: &str, value: f64) {
        self.cache
            .insert((pid.to_string(), vehicle_id.to_string()), value);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Default for PidSampleCache {
    fn default() -> Self {
        Self::new()
    }
}
