//! Registered-key TTL store.

use super::entry::{CacheEntry, Ttl};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub registered: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }
}

/// Keyed store where every key declares its TTL up front.
///
/// A key must be [`register`](Cache::register)ed before `get`/`set`; using an
/// unknown key is [`Error::UnregisteredKey`]. A registered key with no value, or
/// with an expired one, is a plain miss.
pub struct Cache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    stats: AtomicStats,
}

impl<V: Clone> Cache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: AtomicStats::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare `key` with its TTL. Returns `false` (and changes nothing) if the
    /// key is already registered.
    pub fn register(&self, key: &str, ttl: Ttl) -> bool {
        let mut entries = self.write();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_string(), CacheEntry::registered(ttl));
        tracing::trace!(key, ?ttl, "cache key registered");
        true
    }

    pub fn set(&self, key: &str, value: V) -> Result<()> {
        let mut entries = self.write();
        let entry = entries.get_mut(key).ok_or_else(|| Error::unregistered(key))?;
        entry.store(value, Instant::now());
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// `Ok(None)` on a miss (never written, or expired).
    pub fn get(&self, key: &str) -> Result<Option<V>> {
        let entries = self.read();
        let entry = entries.get(key).ok_or_else(|| Error::unregistered(key))?;
        match entry.fresh(Instant::now()) {
            Some(v) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(v.clone()))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.read()
            .get(key)
            .map(|e| e.fresh(Instant::now()).is_some())
            .unwrap_or(false)
    }

    /// Remove the entry entirely. Idempotent.
    pub fn deregister(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    /// Drop the stored value but keep the registration and its TTL.
    pub fn reset(&self, key: &str) -> bool {
        match self.write().get_mut(key) {
            Some(entry) => {
                entry.clear();
                true
            }
            None => false,
        }
    }

    pub fn ttl(&self, key: &str) -> Option<Ttl> {
        self.read().get(key).map(|e| e.ttl)
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Number of registered keys, fresh or not.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            sets: self.stats.sets.load(Ordering::Relaxed),
            registered: self.len(),
        }
    }
}

impl<V: Clone> Default for Cache<V> {
    fn default() -> Self {
        Self::new()
    }
}
