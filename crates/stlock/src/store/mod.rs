//! Store collaborators implementing [`Connection`](crate::Connection)

pub mod memory;

#[cfg(feature = "redis-store")]
pub mod redis;

pub use memory::{MemoryConnection, MemoryStore};

#[cfg(feature = "redis-store")]
pub use self::redis::{RedisConnection, RedisConnectionProvider};
