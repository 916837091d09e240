//! Named async mutex map.
//!
//! Push-pull requests serialize per document on a mutex looked up by name
//! (`pushpull-<doc key>`). Entries are created on demand and reference
//! counted, so the map stays bounded by the number of documents currently
//! being pushed to. Guards release on every exit path, including unwinds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

struct LockEntry {
    mutex: Arc<Mutex<()>>,
    refs: AtomicUsize,
}

/// A map of named async mutexes with reference-counted entries.
#[derive(Clone, Default)]
pub struct LockMap {
    entries: Arc<DashMap<String, Arc<LockEntry>>>,
}

impl LockMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the named lock, waiting at most `timeout`. Returns `None` on
    /// contention timeout.
    pub async fn acquire(&self, key: &str, timeout: Duration) -> Option<LockGuard> {
        // The ref count is bumped while the map entry is held so a
        // concurrently dropped guard cannot reclaim the entry in between.
        let entry = {
            let entry = self.entries.entry(key.to_string()).or_insert_with(|| {
                Arc::new(LockEntry {
                    mutex: Arc::new(Mutex::new(())),
                    refs: AtomicUsize::new(0),
                })
            });
            entry.refs.fetch_add(1, Ordering::SeqCst);
            Arc::clone(&entry)
        };

        match tokio::time::timeout(timeout, entry.mutex.clone().lock_owned()).await {
            Ok(guard) => Some(LockGuard {
                map: Arc::clone(&self.entries),
                key: key.to_string(),
                entry,
                _guard: guard,
            }),
            Err(_) => {
                Self::release_ref(&self.entries, key, &entry);
                None
            }
        }
    }

    /// Number of live entries, for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no live entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn release_ref(map: &DashMap<String, Arc<LockEntry>>, key: &str, entry: &Arc<LockEntry>) {
        if entry.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            map.remove_if(key, |_, e| e.refs.load(Ordering::SeqCst) == 0);
        }
    }
}

/// Holds a named lock until dropped.
pub struct LockGuard {
    map: Arc<DashMap<String, Arc<LockEntry>>>,
    key: String,
    entry: Arc<LockEntry>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        LockMap::release_ref(&self.map, &self.key, &self.entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_exclusion() {
        let locks = LockMap::new();
        let guard = locks.acquire("doc-1", TIMEOUT).await.unwrap();

        // A second acquire on the same key times out while the guard lives.
        let contended = locks
            .acquire("doc-1", Duration::from_millis(50))
            .await;
        assert!(contended.is_none());

        drop(guard);
        assert!(locks.acquire("doc-1", TIMEOUT).await.is_some());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let locks = LockMap::new();
        let _a = locks.acquire("doc-1", TIMEOUT).await.unwrap();
        let _b = locks.acquire("doc-2", TIMEOUT).await.unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_entries_are_reclaimed() {
        let locks = LockMap::new();
        let guard = locks.acquire("doc-1", TIMEOUT).await.unwrap();
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_serializes_concurrent_tasks() {
        let locks = LockMap::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let locks = locks.clone();
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("doc-1", TIMEOUT).await.unwrap();
                // Non-atomic read-modify-write; only mutual exclusion keeps
                // the final count correct.
                let seen = counter.load(Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(seen + 1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
