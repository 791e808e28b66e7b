//! Expiring mutual-exclusion locks
//!
//! A lock is a single store key `<prefix>:<name>` whose value is the owner
//! token of the current holder:
//! - acquire polls a conditional create (`SET NX PX`) until it wins or the
//!   acquire window closes
//! - release deletes the key only if it still carries the caller's token,
//!   inside a watched transaction
//!
//! ## Known limitation
//!
//! Locks carry no fencing token. If the holder's lock expires while it is
//! still in its critical section, another caller can acquire the same name and
//! both run concurrently without either noticing. Pick a lock timeout well
//! above the longest critical section. The holder's later release is then a
//! harmless no-op; it never deletes the new owner's key.

mod acquire;
mod release;

pub use release::ReleaseOutcome;

use crate::config::LockOptions;
use crate::connection::Connection;
use crate::error::LockResult;
use crate::key::{LockKey, OwnerToken};

/// Entry point for acquiring and releasing locks.
///
/// Holds no state besides its options; the store is the only source of truth.
/// Connections are supplied per call, so one manager can be shared by any
/// number of tasks.
#[derive(Debug, Clone, Default)]
pub struct LockManager {
    options: LockOptions,
}

impl LockManager {
    /// Zero durations and an empty prefix in `options` fall back to defaults.
    pub fn new(options: LockOptions) -> Self {
        Self {
            options: options.normalized(),
        }
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Store key used for the lock called `name`.
    pub fn key(&self, name: &str) -> LockKey {
        LockKey::new(&self.options.key_prefix, name)
    }

    /// Value currently stored for `name`, i.e. the holder's token.
    pub async fn current_owner<C>(&self, conn: &mut C, name: &str) -> LockResult<Option<String>>
    where
        C: Connection + ?Sized,
    {
        conn.get(self.key(name).as_str()).await
    }

    /// Whether `token` holds `name` right now.
    ///
    /// Advisory only: the answer can be stale by the time the caller acts on it.
    pub async fn is_held_by<C>(
        &self,
        conn: &mut C,
        name: &str,
        token: &OwnerToken,
    ) -> LockResult<bool>
    where
        C: Connection + ?Sized,
    {
        let owner = self.current_owner(conn, name).await?;
        Ok(owner.as_deref() == Some(token.as_str()))
    }
}
