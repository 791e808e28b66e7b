//! Default values and configuration property names.

/// Default window an acquire call keeps polling for (100ms)
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 100;

/// Default lifetime of a lock key before the store expires it (10s)
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 10 * 1000;

/// Pause between two conditional-create attempts (1ms)
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1;

/// Namespace every lock key is placed under
pub const DEFAULT_KEY_PREFIX: &str = "stlock";

pub const DEFAULT_STORE_HOST: &str = "127.0.0.1";
pub const DEFAULT_STORE_PORT: u16 = 6379;
pub const DEFAULT_STORE_DB: i64 = 0;

/// Environment variable prefix, e.g. `STLOCK_STORE__HOST`
pub const ENV_PREFIX: &str = "stlock";

// Property names
pub const STORE_HOST_PROPERTY: &str = "store.host";
pub const STORE_PORT_PROPERTY: &str = "store.port";
pub const STORE_PASSWORD_PROPERTY: &str = "store.password";
pub const STORE_DB_PROPERTY: &str = "store.db";
pub const LOCK_ACQUIRE_TIMEOUT_PROPERTY: &str = "lock.acquire_timeout_ms";
pub const LOCK_TIMEOUT_PROPERTY: &str = "lock.lock_timeout_ms";
pub const LOCK_RETRY_INTERVAL_PROPERTY: &str = "lock.retry_interval_ms";
pub const LOCK_KEY_PREFIX_PROPERTY: &str = "lock.key_prefix";
