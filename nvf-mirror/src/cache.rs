//! TTL cache with touch-on-hit, backed by `DashMap`.
//!
//! Entries expire `ttl` after their last hit and are lazily evicted on
//! access.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Clone)]
pub struct TtlCache<K, V> {
    inner: Arc<DashMap<K, (V, Instant)>>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Get a cached value if it hasn't expired, resetting its TTL.
    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(mut entry) = self.inner.get_mut(key) {
            let (val, touched) = entry.value_mut();
            if touched.elapsed() < self.ttl {
                let val = val.clone();
                *touched = Instant::now();
                return Some(val);
            }
            drop(entry);
            self.inner.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.insert(key, (value, Instant::now()));
    }

    pub fn remove(&self, key: &K) {
        self.inner.remove(key);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
