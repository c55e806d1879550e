//! Redis-backed TTL cache.
//!
//! Uses `ConnectionManager` for connection pooling and automatic
//! reconnection. Each clone shares the same underlying connection.

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use seatbook_core::error::LockError;
use seatbook_core::locks::TtlCache;
use std::time::Duration;

use crate::config::RedisConfig;

/// Redis-backed [`TtlCache`] for reservation lock entries.
///
/// Expiry is enforced server-side via `SET ... EX`, so lock entries for
/// abandoned bookings vanish on their own.
#[derive(Clone)]
pub struct RedisCache {
    conn_manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis using the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] if the client cannot be created or
    /// the initial connection fails.
    pub async fn connect(config: &RedisConfig) -> Result<Self, LockError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| LockError::Backend(format!("failed to create Redis client: {e}")))?;

        let manager_config =
            ConnectionManagerConfig::new().set_connection_timeout(config.connection_timeout());
        let conn_manager = ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|e| {
                LockError::Backend(format!("failed to create Redis connection manager: {e}"))
            })?;

        tracing::info!(url = %config.url, "connected to Redis");
        Ok(Self { conn_manager })
    }
}

#[async_trait]
impl TtlCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        let mut conn = self.conn_manager.clone();
        conn.get(key)
            .await
            .map_err(|e| LockError::Backend(format!("GET {key} failed: {e}")))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LockError> {
        let mut conn = self.conn_manager.clone();
        // SET EX rejects a zero expiry; clamp sub-second TTLs up to 1s.
        let ttl_seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, value, ttl_seconds)
            .await
            .map_err(|e| LockError::Backend(format!("SETEX {key} failed: {e}")))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LockError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| LockError::Backend(format!("DEL {key} failed: {e}")))?;
        Ok(())
    }
}
