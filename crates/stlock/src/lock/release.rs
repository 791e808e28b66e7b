use tracing::{debug, warn};

use super::LockManager;
use crate::connection::Connection;
use crate::error::{LockError, LockResult};
use crate::key::{LockKey, OwnerToken};
use crate::metrics::record_release;

/// How a successful release ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The key held the caller's token and was deleted
    Released,
    /// The key was absent or held by another owner; nothing was touched
    NotOwner,
}

impl ReleaseOutcome {
    pub fn is_released(&self) -> bool {
        *self == ReleaseOutcome::Released
    }
}

impl LockManager {
    /// Release `name` if it is still held by `token`.
    ///
    /// The key is watched, read, and deleted in a transaction that aborts if
    /// the key changed after the read. A lock that expired or now belongs to
    /// someone else is left alone and reported as
    /// [`ReleaseOutcome::NotOwner`]; that is not an error. An aborted
    /// transaction is reported as [`LockError::ReleaseConflict`] because the
    /// key may or may not still exist.
    ///
    /// The connection's watches are dropped before returning, whatever the
    /// outcome.
    pub async fn release<C>(
        &self,
        conn: &mut C,
        name: &str,
        token: &OwnerToken,
    ) -> LockResult<ReleaseOutcome>
    where
        C: Connection + ?Sized,
    {
        let key = self.key(name);
        let outcome = Self::release_watched(conn, &key, token).await;

        if let Err(e) = conn.unwatch().await {
            warn!(key = %key, error = %e, "Failed to unwatch lock key");
        }

        match &outcome {
            Ok(ReleaseOutcome::Released) => record_release("released"),
            Ok(ReleaseOutcome::NotOwner) => record_release("not_owner"),
            Err(e) => record_release(e.outcome_label()),
        }
        outcome
    }

    async fn release_watched<C>(
        conn: &mut C,
        key: &LockKey,
        token: &OwnerToken,
    ) -> LockResult<ReleaseOutcome>
    where
        C: Connection + ?Sized,
    {
        conn.watch(key.as_str()).await?;

        let current = conn.get(key.as_str()).await?;
        if current.as_deref() != Some(token.as_str()) {
            debug!(key = %key, "Lock not held by caller, skipping delete");
            return Ok(ReleaseOutcome::NotOwner);
        }

        if !conn.delete_if_unchanged(key.as_str()).await? {
            warn!(key = %key, "Lock changed during release");
            return Err(LockError::ReleaseConflict(key.to_string()));
        }

        debug!(key = %key, "Lock released");
        Ok(ReleaseOutcome::Released)
    }
}
