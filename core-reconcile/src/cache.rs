//! In-memory caching with explicit eviction policies
//!
//! Small read-through cache used for remote lookups that are expensive but
//! change rarely, such as the category list of a project. Eviction is an
//! explicit constructor argument rather than an ambient global: callers
//! state up front whether entries age out (TTL) or get displaced (LRU),
//! and time is injected through [`Clock`] so expiry is testable without
//! sleeping.

use chrono::Utc;
use lru::LruCache;
use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

/// Source of "now" for TTL decisions.
pub trait Clock: Send + Sync {
    /// Current time as epoch seconds.
    fn now(&self) -> i64;
}

/// Wall-clock implementation used outside of tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// How entries leave the cache.
#[derive(Debug, Clone, Copy)]
pub enum EvictionPolicy {
    /// Entries expire a fixed duration after insertion.
    Ttl(Duration),
    /// Least-recently-used displacement with a fixed capacity.
    Lru(NonZeroUsize),
}

enum Store<K: Hash + Eq, V> {
    Ttl {
        max_age_secs: i64,
        entries: HashMap<K, (V, i64)>,
    },
    Lru(LruCache<K, V>),
}

/// A thread-safe cache with a caller-chosen eviction policy.
pub struct MemoryCache<K: Hash + Eq + Clone, V: Clone> {
    store: Mutex<Store<K, V>>,
    clock: Box<dyn Clock>,
}

impl<K: Hash + Eq + Clone, V: Clone> MemoryCache<K, V> {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self::with_clock(policy, Box::new(SystemClock))
    }

    /// Construct with an injected clock. Tests pass a manual clock and
    /// advance it instead of sleeping through TTL windows.
    pub fn with_clock(policy: EvictionPolicy, clock: Box<dyn Clock>) -> Self {
        let store = match policy {
            EvictionPolicy::Ttl(max_age) => Store::Ttl {
                max_age_secs: max_age.as_secs() as i64,
                entries: HashMap::new(),
            },
            EvictionPolicy::Lru(capacity) => Store::Lru(LruCache::new(capacity)),
        };

        Self {
            store: Mutex::new(store),
            clock,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut store = match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match &mut *store {
            Store::Ttl {
                max_age_secs,
                entries,
            } => {
                let now = self.clock.now();
                match entries.get(key) {
                    Some((value, inserted_at)) if now - inserted_at < *max_age_secs => {
                        Some(value.clone())
                    }
                    Some(_) => {
                        entries.remove(key);
                        None
                    }
                    None => None,
                }
            }
            Store::Lru(cache) => cache.get(key).cloned(),
        }
    }

    pub fn put(&self, key: K, value: V) {
        let mut store = match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match &mut *store {
            Store::Ttl { entries, .. } => {
                entries.insert(key, (value, self.clock.now()));
            }
            Store::Lru(cache) => {
                cache.put(key, value);
            }
        }
    }

    pub fn invalidate(&self, key: &K) {
        let mut store = match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match &mut *store {
            Store::Ttl { entries, .. } => {
                entries.remove(key);
            }
            Store::Lru(cache) => {
                cache.pop(key);
            }
        }
    }

    pub fn clear(&self) {
        let mut store = match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match &mut *store {
            Store::Ttl { entries, .. } => entries.clear(),
            Store::Lru(cache) => cache.clear(),
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> std::fmt::Debug for MemoryCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache").finish_non_exhaustive()
    }
}
