//! Per-key serialization.
//!
//! [`KeyedLocks`] hands out one async mutex per key. Work for the same key
//! queues behind the current holder; work for different keys never
//! contends. The lock is released when the [`KeyGuard`] is dropped, which
//! also covers a task aborted mid-await, and idle entries are removed so
//! the map only holds keys that are in use.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: K) -> KeyGuard<K> {
        let mutex = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let guard = mutex.lock_owned().await;
        KeyGuard {
            key,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Take `key` only if nobody holds it.
    pub fn try_acquire(&self, key: K) -> Option<KeyGuard<K>> {
        let mutex = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let guard = mutex.try_lock_owned().ok()?;
        Some(KeyGuard {
            key,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        })
    }

    #[must_use]
    pub fn is_locked(&self, key: &K) -> bool {
        self.locks
            .get(key)
            .is_some_and(|m| m.value().try_lock().is_err())
    }

    /// Keys currently held or waited on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive hold on one key.
pub struct KeyGuard<K: Eq + Hash + Clone> {
    key: K,
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> KeyGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        // Unlock first so the strong count reflects only the map and waiters.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
