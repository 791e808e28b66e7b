use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::LockManager;
use crate::config::{duration_millis, non_zero_or};
use crate::connection::Connection;
use crate::error::{LockError, LockResult};
use crate::key::OwnerToken;
use crate::metrics::record_acquire;

impl LockManager {
    /// Acquire `name` with the configured acquire and lock timeouts.
    pub async fn acquire<C>(&self, conn: &mut C, name: &str) -> LockResult<OwnerToken>
    where
        C: Connection + ?Sized,
    {
        self.acquire_with(conn, name, Duration::ZERO, Duration::ZERO)
            .await
    }

    /// Acquire `name`, polling for at most `acquire_timeout`; the lock key
    /// expires after `lock_timeout` unless released first.
    ///
    /// A zero duration selects the configured value. Returns the owner token
    /// needed for [`release`](Self::release), or
    /// [`LockError::AcquireTimeout`] if the key stayed taken for the whole
    /// window. Store errors abort immediately without retrying.
    pub async fn acquire_with<C>(
        &self,
        conn: &mut C,
        name: &str,
        acquire_timeout: Duration,
        lock_timeout: Duration,
    ) -> LockResult<OwnerToken>
    where
        C: Connection + ?Sized,
    {
        let acquire_timeout = non_zero_or(acquire_timeout, self.options.acquire_timeout);
        let lock_timeout = non_zero_or(lock_timeout, self.options.lock_timeout);

        let key = self.key(name);
        let token = OwnerToken::generate();
        let started = Instant::now();
        let deadline = started + acquire_timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let acquired = match conn
                .set_if_absent(key.as_str(), token.as_str(), lock_timeout)
                .await
            {
                Ok(acquired) => acquired,
                Err(e) => {
                    record_acquire(e.outcome_label(), started.elapsed());
                    return Err(e);
                }
            };

            if acquired {
                debug!(key = %key, attempts, "Lock acquired");
                record_acquire("acquired", started.elapsed());
                return Ok(token);
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.options.retry_interval.min(deadline - now)).await;
        }

        debug!(
            key = %key,
            attempts,
            timeout_ms = duration_millis(acquire_timeout),
            "Lock acquire timed out"
        );
        record_acquire("timeout", started.elapsed());
        Err(LockError::AcquireTimeout {
            key: key.to_string(),
            timeout: acquire_timeout,
        })
    }
}
