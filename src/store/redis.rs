//! Redis-backed session store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;

use super::SessionStore;
use crate::error::{Error, Result};

/// Session store over a Redis instance.
///
/// The connection manager is opened once on [`SessionStore::connect`] and
/// reused for all subsequent commands; it reconnects on its own after
/// transient failures.
pub struct RedisStore {
    client: redis::Client,
    conn: RwLock<Option<ConnectionManager>>,
}

impl RedisStore {
    /// Create a store from a DSN (`redis://host:port`).
    ///
    /// The DSN is parsed eagerly; no connection is made until `connect`.
    pub fn new(dsn: &str) -> Result<Self> {
        let client = redis::Client::open(dsn)
            .map_err(|e| Error::Config(format!("invalid redis DSN: {e}")))?;
        Ok(Self {
            client,
            conn: RwLock::new(None),
        })
    }

    /// Clone out the live connection manager.
    async fn manager(&self) -> Result<ConnectionManager> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Store("redis store is not connected".into()))
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn connect(&self) -> Result<()> {
        {
            let guard = self.conn.read().await;
            if guard.is_some() {
                tracing::debug!("redis connection already established, reusing");
                return Ok(());
            }
        }

        let mut guard = self.conn.write().await;
        // A concurrent connect may have won the race.
        if guard.is_none() {
            let manager = self
                .client
                .get_connection_manager()
                .await
                .map_err(|e| Error::Store(format!("failed to connect to redis: {e}")))?;
            *guard = Some(manager);
            tracing::debug!("redis connection established");
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager().await?;
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("redis GET failed: {e}")))?;

        tracing::trace!(key = %key, hit = value.is_some(), "redis get");
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Error::Store(format!("redis SET failed: {e}")))?;

        tracing::trace!(key = %key, ttl_secs = ttl.as_secs(), "redis set");
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        let Ok(mut conn) = self.manager().await else {
            return false;
        };
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(response) => response == "PONG",
            Err(_) => false,
        }
    }
}
