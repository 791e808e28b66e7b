//! Store connection capability
//!
//! The lock protocol only needs a handful of store primitives. They are
//! expressed here as traits so the same acquire/release code runs against a
//! Redis server or the in-process [`MemoryStore`](crate::store::MemoryStore).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::LockResult;

/// A single request/response channel to the store.
///
/// Watch state is bound to the connection, so one connection must not be used
/// by two release calls at the same time. Methods take `&mut self` for that
/// reason.
#[async_trait]
pub trait Connection: Send {
    /// Create `key = value` expiring after `ttl`, only if `key` is absent.
    ///
    /// Returns `Ok(false)` when the key already exists. Any other failure is
    /// an error.
    async fn set_if_absent(&mut self, key: &str, value: &str, ttl: Duration) -> LockResult<bool>;

    /// Current value of `key`, `None` when absent.
    async fn get(&mut self, key: &str) -> LockResult<Option<String>>;

    /// Unconditional write without expiry.
    async fn set(&mut self, key: &str, value: &str) -> LockResult<()>;

    /// Start watching `key`; a later [`delete_if_unchanged`](Self::delete_if_unchanged)
    /// aborts if the key is written, deleted or expires in between.
    async fn watch(&mut self, key: &str) -> LockResult<()>;

    /// Drop every watch held by this connection.
    async fn unwatch(&mut self) -> LockResult<()>;

    /// Delete `key` in a transaction guarded by the current watches.
    ///
    /// Returns `Ok(false)` when the transaction was aborted because a watched
    /// key changed. Watches are consumed either way.
    async fn delete_if_unchanged(&mut self, key: &str) -> LockResult<bool>;

    /// Round-trip health probe.
    async fn ping(&mut self) -> LockResult<()>;
}

/// Hands out connections to one store.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    type Conn: Connection;

    async fn get(&self) -> LockResult<Self::Conn>;
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for Box<C> {
    async fn set_if_absent(&mut self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn get(&mut self, key: &str) -> LockResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&mut self, key: &str, value: &str) -> LockResult<()> {
        (**self).set(key, value).await
    }

    async fn watch(&mut self, key: &str) -> LockResult<()> {
        (**self).watch(key).await
    }

    async fn unwatch(&mut self) -> LockResult<()> {
        (**self).unwatch().await
    }

    async fn delete_if_unchanged(&mut self, key: &str) -> LockResult<bool> {
        (**self).delete_if_unchanged(key).await
    }

    async fn ping(&mut self) -> LockResult<()> {
        (**self).ping().await
    }
}
