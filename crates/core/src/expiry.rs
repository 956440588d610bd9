//! Keyed store whose entries lapse after a time-to-live.
//!
//! Used for webhook deduplication and for caching reference data fetched
//! from integration backends. Expired entries are ignored on read and are
//! removed on every write or by an explicit [`ExpiringMap::sweep`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct ExpiringMap<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Mutex::new(HashMap::new()), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &K, now: Instant) -> Option<V>
    where
        V: Clone,
    {
        self.lock().get(key).filter(|entry| entry.expires_at > now).map(|entry| entry.value.clone())
    }

    /// Stores `value` with the default TTL, replacing any previous entry.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl_at(key, value, self.ttl, Instant::now());
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.insert_with_ttl_at(key, value, ttl, Instant::now());
    }

    pub fn insert_with_ttl_at(&self, key: K, value: V, ttl: Duration, now: Instant) {
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(key, Entry { value, expires_at: now + ttl });
    }

    /// Atomic check-and-insert. Returns `true` when the key was absent (or
    /// expired) and is now recorded.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        self.insert_if_absent_at(key, value, Instant::now())
    }

    pub fn insert_if_absent_at(&self, key: K, value: V, now: Instant) -> bool {
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.expires_at > now);
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, Entry { value, expires_at: now + self.ttl });
        true
    }

    /// Drops expired entries and returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Entry count including not-yet-swept expired entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
