//! Redis-backed connections.
//!
//! Lock keys are created with `SET key token PX ttl NX` and released with
//! `WATCH` / `GET` / `MULTI DEL EXEC`. Redis keeps watch state per socket, so
//! every [`RedisConnection`] owns its own multiplexed connection and is not
//! `Clone`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::{debug, info};

use crate::config::{StoreConfig, duration_millis};
use crate::connection::{Connection, ConnectionProvider};
use crate::error::{LockError, LockResult};

/// Opens connections to one Redis server.
#[derive(Clone)]
pub struct RedisConnectionProvider {
    client: Client,
    addr: String,
}

impl RedisConnectionProvider {
    /// Build the client and check that the server answers `PING`.
    pub async fn connect(config: &StoreConfig) -> LockResult<Self> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db: config.db,
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = Client::open(info).map_err(|e| LockError::Connection(e.to_string()))?;
        let provider = Self {
            client,
            addr: config.addr(),
        };

        let mut conn = provider.get().await?;
        conn.ping().await?;

        info!(addr = %provider.addr, db = config.db, "Connected to lock store");
        Ok(provider)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl ConnectionProvider for RedisConnectionProvider {
    type Conn = RedisConnection;

    async fn get(&self) -> LockResult<RedisConnection> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LockError::Connection(format!("{}: {}", self.addr, e)))?;
        debug!(addr = %self.addr, "Opened store connection");
        Ok(RedisConnection::new(conn))
    }
}

/// `PX` argument for `ttl`; Redis rejects 0.
fn px_millis(ttl: Duration) -> u64 {
    duration_millis(ttl).max(1)
}

/// One dedicated Redis socket.
pub struct RedisConnection {
    conn: MultiplexedConnection,
}

impl RedisConnection {
    /// `conn` must not be shared with another `RedisConnection`: clones of a
    /// multiplexed connection share one socket and therefore one watch set.
    pub(crate) fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Connection for RedisConnection {
    async fn set_if_absent(&mut self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        let ttl_ms = px_millis(ttl);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .arg("NX")
            .query_async(&mut self.conn)
            .await?;

        match reply.as_deref() {
            Some("OK") => Ok(true),
            None => Ok(false),
            Some(other) => Err(LockError::Protocol(format!(
                "unexpected SET reply for {}: {}",
                key, other
            ))),
        }
    }

    async fn get(&mut self, key: &str) -> LockResult<Option<String>> {
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut self.conn).await?;
        Ok(value)
    }

    async fn set(&mut self, key: &str, value: &str) -> LockResult<()> {
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn watch(&mut self, key: &str) -> LockResult<()> {
        let _: () = redis::cmd("WATCH").arg(key).query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn unwatch(&mut self) -> LockResult<()> {
        let _: () = redis::cmd("UNWATCH").query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn delete_if_unchanged(&mut self, key: &str) -> LockResult<bool> {
        // EXEC answers nil when a watched key changed
        let reply: Option<(i64,)> = redis::pipe()
            .atomic()
            .del(key)
            .query_async(&mut self.conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn ping(&mut self) -> LockResult<()> {
        let pong: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        if pong != "PONG" {
            return Err(LockError::Connection(format!("unexpected PING reply: {}", pong)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_px_millis() {
        assert_eq!(px_millis(Duration::ZERO), 1);
        assert_eq!(px_millis(Duration::from_micros(300)), 1);
        assert_eq!(px_millis(Duration::from_secs(10)), 10_000);
        assert_eq!(px_millis(Duration::MAX), u64::MAX);
    }
}
