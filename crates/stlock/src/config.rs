//! Lock and store configuration
//!
//! Settings come from an optional config file (any format the `config` crate
//! understands, picked by extension) overlaid with `STLOCK_*` environment
//! variables, where `__` separates nested keys:
//!
//! ```text
//! STLOCK_STORE__HOST=10.0.0.5
//! STLOCK_LOCK__ACQUIRE_TIMEOUT_MS=250
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ACQUIRE_TIMEOUT_MS, DEFAULT_KEY_PREFIX, DEFAULT_LOCK_TIMEOUT_MS,
    DEFAULT_RETRY_INTERVAL_MS, DEFAULT_STORE_DB, DEFAULT_STORE_HOST, DEFAULT_STORE_PORT,
    ENV_PREFIX, LOCK_ACQUIRE_TIMEOUT_PROPERTY, LOCK_KEY_PREFIX_PROPERTY,
    LOCK_RETRY_INTERVAL_PROPERTY, LOCK_TIMEOUT_PROPERTY, STORE_DB_PROPERTY, STORE_HOST_PROPERTY,
    STORE_PASSWORD_PROPERTY, STORE_PORT_PROPERTY,
};
use crate::error::{LockError, LockResult};

/// Timing and naming of locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// How long acquire keeps polling before giving up
    pub acquire_timeout: Duration,
    /// Expiry attached to the lock key
    pub lock_timeout: Duration,
    /// Pause between two failed conditional creates
    pub retry_interval: Duration,
    /// Namespace prepended to every lock name
    pub key_prefix: String,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl LockOptions {
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Replace zero durations and an empty prefix with the built-in defaults.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            acquire_timeout: non_zero_or(self.acquire_timeout, defaults.acquire_timeout),
            lock_timeout: non_zero_or(self.lock_timeout, defaults.lock_timeout),
            retry_interval: non_zero_or(self.retry_interval, defaults.retry_interval),
            key_prefix: if self.key_prefix.is_empty() {
                defaults.key_prefix
            } else {
                self.key_prefix
            },
        }
    }
}

pub(crate) fn non_zero_or(value: Duration, default: Duration) -> Duration {
    if value.is_zero() { default } else { value }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn duration_millis(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

/// Non-positive millisecond values select the default.
fn millis_or(value: Option<i64>, default_ms: u64) -> Duration {
    match value {
        Some(ms) if ms > 0 => Duration::from_millis(ms as u64),
        _ => Duration::from_millis(default_ms),
    }
}

/// `STLOCK_STORE__HOST` -> `store.host`: `_` after the prefix, `__` between levels.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Where the store lives and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical database index
    pub db: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_STORE_HOST.to_string(),
            port: DEFAULT_STORE_PORT,
            password: None,
            db: DEFAULT_STORE_DB,
        }
    }
}

impl StoreConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loaded configuration with typed accessors.
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load from `path` (if given and present) plus `STLOCK_*` environment variables.
    pub fn load(path: Option<&Path>) -> LockResult<Self> {
        Self::load_with_environment(path, environment())
    }

    fn load_with_environment(path: Option<&Path>, env: Environment) -> LockResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let config = builder.add_source(env).build()?;

        Ok(Self { config })
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    // ========================================================================
    // Store
    // ========================================================================

    pub fn store_host(&self) -> String {
        self.config
            .get_string(STORE_HOST_PROPERTY)
            .unwrap_or(DEFAULT_STORE_HOST.to_string())
    }

    pub fn store_port(&self) -> LockResult<u16> {
        match self.config.get_int(STORE_PORT_PROPERTY) {
            Ok(port) => u16::try_from(port)
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| {
                    LockError::Config(format!("invalid {}: {}", STORE_PORT_PROPERTY, port))
                }),
            Err(config::ConfigError::NotFound(_)) => Ok(DEFAULT_STORE_PORT),
            Err(e) => Err(e.into()),
        }
    }

    pub fn store_password(&self) -> Option<String> {
        self.config
            .get_string(STORE_PASSWORD_PROPERTY)
            .ok()
            .filter(|p| !p.is_empty())
    }

    pub fn store_db(&self) -> i64 {
        self.config
            .get_int(STORE_DB_PROPERTY)
            .unwrap_or(DEFAULT_STORE_DB)
    }

    pub fn store_config(&self) -> LockResult<StoreConfig> {
        Ok(StoreConfig {
            host: self.store_host(),
            port: self.store_port()?,
            password: self.store_password(),
            db: self.store_db(),
        })
    }

    // ========================================================================
    // Lock
    // ========================================================================

    pub fn acquire_timeout(&self) -> Duration {
        millis_or(
            self.config.get_int(LOCK_ACQUIRE_TIMEOUT_PROPERTY).ok(),
            DEFAULT_ACQUIRE_TIMEOUT_MS,
        )
    }

    pub fn lock_timeout(&self) -> Duration {
        millis_or(
            self.config.get_int(LOCK_TIMEOUT_PROPERTY).ok(),
            DEFAULT_LOCK_TIMEOUT_MS,
        )
    }

    pub fn retry_interval(&self) -> Duration {
        millis_or(
            self.config.get_int(LOCK_RETRY_INTERVAL_PROPERTY).ok(),
            DEFAULT_RETRY_INTERVAL_MS,
        )
    }

    pub fn key_prefix(&self) -> String {
        self.config
            .get_string(LOCK_KEY_PREFIX_PROPERTY)
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_KEY_PREFIX.to_string())
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            acquire_timeout: self.acquire_timeout(),
            lock_timeout: self.lock_timeout(),
            retry_interval: self.retry_interval(),
            key_prefix: self.key_prefix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn configuration(pairs: &[(&str, &str)]) -> Configuration {
        let mut builder = Config::builder();
        for (k, v) in pairs {
            builder = builder.set_override(*k, *v).unwrap();
        }
        Configuration::from_config(builder.build().unwrap())
    }

    #[test]
    fn test_defaults() {
        let cfg = Configuration::default();
        assert_eq!(cfg.lock_options(), LockOptions::default());
        assert_eq!(cfg.store_config().unwrap(), StoreConfig::default());
        assert_eq!(cfg.acquire_timeout(), Duration::from_millis(100));
        assert_eq!(cfg.lock_timeout(), Duration::from_millis(10_000));
        assert_eq!(cfg.retry_interval(), Duration::from_millis(1));
        assert_eq!(cfg.key_prefix(), "stlock");
    }

    #[test]
    fn test_non_positive_durations_fall_back_to_defaults() {
        let cfg = configuration(&[
            ("lock.acquire_timeout_ms", "0"),
            ("lock.lock_timeout_ms", "-5"),
        ]);
        assert_eq!(cfg.acquire_timeout(), Duration::from_millis(100));
        assert_eq!(cfg.lock_timeout(), Duration::from_millis(10_000));
    }

    #[test]
    fn test_overrides() {
        let cfg = configuration(&[
            ("store.host", "10.0.0.5"),
            ("store.port", "6380"),
            ("store.password", "secret"),
            ("store.db", "3"),
            ("lock.acquire_timeout_ms", "250"),
            ("lock.key_prefix", "jobs"),
        ]);

        let store = cfg.store_config().unwrap();
        assert_eq!(store.addr(), "10.0.0.5:6380");
        assert_eq!(store.password.as_deref(), Some("secret"));
        assert_eq!(store.db, 3);

        let options = cfg.lock_options();
        assert_eq!(options.acquire_timeout, Duration::from_millis(250));
        assert_eq!(options.lock_timeout, Duration::from_millis(10_000));
        assert_eq!(options.key_prefix, "jobs");
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let cfg = configuration(&[("store.port", "70000")]);
        assert!(matches!(cfg.store_port(), Err(LockError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stlock.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[store]\nhost = \"redis.internal\"\nport = 6390\n").unwrap();
        writeln!(file, "[lock]\nlock_timeout_ms = 3000").unwrap();
        drop(file);

        let cfg = Configuration::load(Some(&path)).unwrap();
        assert_eq!(cfg.store_host(), "redis.internal");
        assert_eq!(cfg.store_port().unwrap(), 6390);
        assert_eq!(cfg.lock_timeout(), Duration::from_millis(3000));
    }

    fn env_vars(pairs: &[(&str, &str)]) -> Environment {
        let vars: config::Map<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(vars))
    }

    #[test]
    fn test_environment_overrides() {
        let env = env_vars(&[
            ("STLOCK_STORE__HOST", "10.0.0.5"),
            ("STLOCK_STORE__PORT", "6390"),
            ("STLOCK_LOCK__ACQUIRE_TIMEOUT_MS", "250"),
            ("STLOCK_LOCK__KEY_PREFIX", "jobs"),
            ("OTHER_STORE__HOST", "ignored"),
        ]);
        let cfg = Configuration::load_with_environment(None, env).unwrap();
        assert_eq!(cfg.store_host(), "10.0.0.5");
        assert_eq!(cfg.store_port().unwrap(), 6390);
        assert_eq!(cfg.acquire_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.key_prefix(), "jobs");
        assert_eq!(cfg.lock_timeout(), Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS));
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stlock.toml");
        std::fs::write(&path, "[store]\nhost = \"redis.internal\"\nport = 6390\n").unwrap();

        let env = env_vars(&[("STLOCK_STORE__HOST", "10.0.0.9")]);
        let cfg = Configuration::load_with_environment(Some(&path), env).unwrap();
        assert_eq!(cfg.store_host(), "10.0.0.9");
        assert_eq!(cfg.store_port().unwrap(), 6390);
    }

    #[test]
    fn test_load_bundled_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../conf/stlock.yml");
        let cfg = Configuration::load(Some(&path)).unwrap();
        assert_eq!(cfg.store_config().unwrap(), StoreConfig::default());
        assert_eq!(cfg.lock_options(), LockOptions::default());
    }

    #[test]
    fn test_missing_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Configuration::load(Some(&dir.path().join("absent.yml"))).unwrap();
        assert_eq!(cfg.store_port().unwrap(), 6379);
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::ZERO), 0);
        assert_eq!(duration_millis(Duration::from_micros(1_500)), 1);
        assert_eq!(duration_millis(Duration::from_secs(10)), 10_000);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_normalized_options() {
        let options = LockOptions::default()
            .with_acquire_timeout(Duration::ZERO)
            .with_retry_interval(Duration::ZERO)
            .with_key_prefix("")
            .normalized();
        assert_eq!(options, LockOptions::default());

        let options = LockOptions::default()
            .with_lock_timeout(Duration::from_secs(2))
            .normalized();
        assert_eq!(options.lock_timeout, Duration::from_secs(2));
    }
}
