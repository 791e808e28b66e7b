//! In-process store with the same semantics as the Redis collaborator.
//!
//! Keys expire lazily: an expired entry is dropped the next time anything
//! looks at it, and that drop counts as a modification for watchers, the same
//! way an expiry aborts a Redis transaction. [`MemoryStore::len`] sweeps every
//! expired entry, and revisions are only kept while a key exists or is watched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::connection::{Connection, ConnectionProvider};
use crate::error::LockResult;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Last revision that modified each key, for keys that exist or are
    /// watched. A missing revision reads as 0, which no modification produces.
    revisions: HashMap<String, u64>,
    /// Number of connections watching each key
    watchers: HashMap<String, usize>,
    clock: u64,
}

impl Inner {
    fn touch(&mut self, key: &str) {
        self.clock += 1;
        if self.entries.contains_key(key) || self.watchers.contains_key(key) {
            self.revisions.insert(key.to_string(), self.clock);
        } else {
            self.revisions.remove(key);
        }
    }

    fn purge_if_expired(&mut self, key: &str, now: Instant) {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| now >= at);
        if expired {
            self.entries.remove(key);
            self.touch(key);
        }
    }

    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at.is_some_and(|at| now >= at))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.entries.remove(&key);
            self.touch(&key);
        }
    }

    fn revision(&mut self, key: &str, now: Instant) -> u64 {
        self.purge_if_expired(key, now);
        self.revisions.get(key).copied().unwrap_or(0)
    }

    fn watch(&mut self, key: &str, now: Instant) -> u64 {
        *self.watchers.entry(key.to_string()).or_default() += 1;
        self.revision(key, now)
    }

    fn unwatch(&mut self, key: &str) {
        let Some(count) = self.watchers.get_mut(key) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.watchers.remove(key);
            if !self.entries.contains_key(key) {
                self.revisions.remove(key);
            }
        }
    }
}

/// Shared in-memory key space.
///
/// Cloning is cheap and every clone sees the same keys. Each
/// [`get`](ConnectionProvider::get) returns an independent connection with its
/// own watch set.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> MemoryConnection {
        MemoryConnection {
            inner: self.inner.clone(),
            watched: HashMap::new(),
        }
    }

    /// Number of live (unexpired) keys. Drops every expired entry on the way.
    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.purge_expired(Instant::now());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of `key`, `None` if absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.purge_if_expired(key, now);
        inner
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }
}

#[async_trait]
impl ConnectionProvider for MemoryStore {
    type Conn = MemoryConnection;

    async fn get(&self) -> LockResult<MemoryConnection> {
        Ok(self.connection())
    }
}

/// Connection to a [`MemoryStore`].
pub struct MemoryConnection {
    inner: Arc<Mutex<Inner>>,
    /// key -> revision observed when the watch started
    watched: HashMap<String, u64>,
}

impl MemoryConnection {
    fn release_watches(&mut self) {
        if self.watched.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        for key in self.watched.keys() {
            inner.unwatch(key);
        }
        self.watched.clear();
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release_watches();
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn set_if_absent(&mut self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.purge_if_expired(key, now);
        if inner.entries.contains_key(key) {
            return Ok(false);
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        inner.touch(key);
        Ok(true)
    }

    async fn get(&mut self, key: &str) -> LockResult<Option<String>> {
        let mut inner = self.inner.lock();
        inner.purge_if_expired(key, Instant::now());
        Ok(inner.entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&mut self, key: &str, value: &str) -> LockResult<()> {
        let mut inner = self.inner.lock();
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        inner.touch(key);
        Ok(())
    }

    async fn watch(&mut self, key: &str) -> LockResult<()> {
        // a repeated WATCH keeps the original revision, as Redis does
        if self.watched.contains_key(key) {
            return Ok(());
        }
        let revision = self.inner.lock().watch(key, Instant::now());
        self.watched.insert(key.to_string(), revision);
        Ok(())
    }

    async fn unwatch(&mut self) -> LockResult<()> {
        self.release_watches();
        Ok(())
    }

    async fn delete_if_unchanged(&mut self, key: &str) -> LockResult<bool> {
        let watched = std::mem::take(&mut self.watched);
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let unchanged = watched
            .iter()
            .all(|(k, revision)| inner.revision(k, now) == *revision);
        for k in watched.keys() {
            inner.unwatch(k);
        }
        if !unchanged {
            return Ok(false);
        }

        if inner.entries.remove(key).is_some() {
            inner.touch(key);
        }
        Ok(true)
    }

    async fn ping(&mut self) -> LockResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent() {
        let store = MemoryStore::new();
        let mut conn = store.connection();

        assert!(conn.set_if_absent("k", "a", Duration::from_secs(10)).await.unwrap());
        assert!(!conn.set_if_absent("k", "b", Duration::from_secs(10)).await.unwrap());
        assert_eq!(conn.get("k").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_expire() {
        let store = MemoryStore::new();
        let mut conn = store.connection();

        conn.set_if_absent("k", "a", Duration::from_millis(100)).await.unwrap();
        assert!(store.ttl("k").is_some());

        tokio::time::sleep(Duration::from_millis(101)).await;
        assert_eq!(conn.get("k").await.unwrap(), None);
        assert!(store.is_empty());
        assert!(conn.set_if_absent("k", "b", Duration::from_millis(100)).await.unwrap());
    }

    #[tokio::test]
    async fn test_transaction_commits_when_untouched() {
        let store = MemoryStore::new();
        let mut conn = store.connection();
        conn.set("k", "a").await.unwrap();

        conn.watch("k").await.unwrap();
        assert!(conn.delete_if_unchanged("k").await.unwrap());
        assert_eq!(conn.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transaction_aborts_on_concurrent_write() {
        let store = MemoryStore::new();
        let mut conn = store.connection();
        let mut other = store.connection();
        conn.set("k", "a").await.unwrap();

        conn.watch("k").await.unwrap();
        // same value still counts as a modification
        other.set("k", "a").await.unwrap();

        assert!(!conn.delete_if_unchanged("k").await.unwrap());
        assert_eq!(conn.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transaction_aborts_on_expiry() {
        let store = MemoryStore::new();
        let mut conn = store.connection();
        conn.set_if_absent("k", "a", Duration::from_millis(10)).await.unwrap();

        conn.watch("k").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!conn.delete_if_unchanged("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_unwatch_clears_watches() {
        let store = MemoryStore::new();
        let mut conn = store.connection();
        let mut other = store.connection();
        conn.set("k", "a").await.unwrap();

        conn.watch("k").await.unwrap();
        conn.unwatch().await.unwrap();
        other.set("k", "b").await.unwrap();

        assert!(conn.delete_if_unchanged("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_watches_are_per_connection() {
        let store = MemoryStore::new();
        let mut a = store.connection();
        let mut b = store.connection();
        a.set("k", "v").await.unwrap();

        a.watch("k").await.unwrap();
        // b never watched, so its transaction is unconditional
        assert!(b.delete_if_unchanged("k").await.unwrap());
        assert!(!a.delete_if_unchanged("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_watch_on_absent_key_sees_create_and_delete() {
        let store = MemoryStore::new();
        let mut a = store.connection();
        let mut b = store.connection();

        a.watch("k").await.unwrap();
        b.set("k", "v").await.unwrap();
        b.watch("k").await.unwrap();
        assert!(b.delete_if_unchanged("k").await.unwrap());

        // key is absent again, but a still saw it change
        assert!(!a.delete_if_unchanged("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bookkeeping_is_bounded() {
        let store = MemoryStore::new();
        let mut conn = store.connection();

        for i in 0..100 {
            let key = format!("expiring:{i}");
            assert!(conn.set_if_absent(&key, "v", Duration::from_millis(10)).await.unwrap());
        }
        for i in 0..100 {
            let key = format!("released:{i}");
            conn.set_if_absent(&key, "v", Duration::from_secs(60)).await.unwrap();
            conn.watch(&key).await.unwrap();
            assert!(conn.delete_if_unchanged(&key).await.unwrap());
        }
        {
            let mut watcher = store.connection();
            watcher.watch("dropped").await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.len(), 0);
        let inner = store.inner.lock();
        assert!(inner.entries.is_empty());
        assert!(inner.revisions.is_empty());
        assert!(inner.watchers.is_empty());
    }
}
