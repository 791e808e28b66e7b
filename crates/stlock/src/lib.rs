//! stlock - expiring mutual-exclusion locks over a shared key-value store
//!
//! This crate provides:
//! - Lock acquire with bounded polling and a per-lock expiry
//! - Safe release that only deletes a lock still owned by the caller
//! - A `Connection` capability with Redis and in-memory implementations
//! - Configuration loading from files and `STLOCK_*` environment variables
//!
//! ```rust,no_run
//! use stlock::{Configuration, ConnectionProvider, LockManager, RedisConnectionProvider};
//!
//! # async fn example() -> stlock::LockResult<()> {
//! let cfg = Configuration::load(None)?;
//! let provider = RedisConnectionProvider::connect(&cfg.store_config()?).await?;
//! let manager = LockManager::new(cfg.lock_options());
//!
//! let mut conn = provider.get().await?;
//! let token = manager.acquire(&mut conn, "doc:123").await?;
//! // ... guarded work ...
//! manager.release(&mut conn, "doc:123", &token).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod key;
pub mod lock;
pub mod metrics;
pub mod store;

pub use config::{Configuration, LockOptions, StoreConfig};
pub use connection::{Connection, ConnectionProvider};
pub use error::{LockError, LockResult};
pub use key::{LockKey, OwnerToken};
pub use lock::{LockManager, ReleaseOutcome};
pub use store::{MemoryConnection, MemoryStore};

#[cfg(feature = "redis-store")]
pub use store::{RedisConnection, RedisConnectionProvider};
