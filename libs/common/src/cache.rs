//! Redis cache module
//!
//! This module provides the connection to Redis and the commands the
//! services need: an atomic counter increment used for rate limiting and a
//! health check.

use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::info;

use crate::error::{CacheError, CacheResult};

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    pub fn from_env() -> CacheResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        if url.is_empty() {
            return Err(CacheError::Configuration("REDIS_URL is empty".to_string()));
        }

        Ok(RedisConfig { url })
    }
}

/// Redis client handle
///
/// Holds one multiplexed connection, opened in [`RedisPool::new`] and
/// re-established by the manager when it drops. Clones share it.
#[derive(Clone)]
pub struct RedisPool {
    manager: ConnectionManager,
}

impl RedisPool {
    /// Connect to Redis
    pub async fn new(config: &RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        info!("Redis connection established with URL: {}", config.url);
        Ok(RedisPool { manager })
    }

    /// Atomically increment a counter and return its new value
    ///
    /// The TTL is attached only when the increment created the key, so a
    /// counter expires `ttl_seconds` after its first hit and never later.
    pub async fn incr_with_expiry(&self, key: &str, ttl_seconds: u64) -> CacheResult<u64> {
        let mut conn = self.manager.clone();
        let count: u64 = conn.incr(key, 1u64).await?;

        if count == 1 {
            let _: () = conn.expire(key, ttl_seconds as i64).await?;
        }

        Ok(count)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}
