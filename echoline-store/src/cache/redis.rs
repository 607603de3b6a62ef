//! Redis-backed history cache
//!
//! Values are the JSON-encoded turn list stored with `SET key value EX ttl`,
//! so expiry is enforced by the server. Every command runs under
//! `CacheConfig::command_timeout`; a slow server reads as unavailable.

use crate::cache::{config::CacheConfig, decode_turns, encode_turns, CacheResult, CacheStore};
use crate::error::CacheUnavailable;
use crate::health::HealthStatus;
use crate::schema::Turn;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct RedisCache {
    config: CacheConfig,
    conn: ConnectionManager,
}

impl RedisCache {
    /// Open a managed connection to `url` (e.g. `redis://127.0.0.1:6379`)
    pub async fn connect(url: &str, config: CacheConfig) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;

        let conn = tokio::time::timeout(config.command_timeout * 4, client.get_connection_manager())
            .await
            .map_err(|_| CacheUnavailable::new(format!("Timed out connecting to {}", url)))??;

        info!("Connected to Redis history cache at {}", url);
        Ok(Self { config, conn })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(result) => result.map_err(CacheUnavailable::from),
            Err(_) => Err(CacheUnavailable::new(format!(
                "Redis {} timed out after {:?}",
                op, self.config.command_timeout
            ))),
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, user_id: &str) -> CacheResult<Option<Vec<Turn>>> {
        let key = self.config.history_key(user_id);
        let mut conn = self.conn.clone();

        let raw: Option<String> = self
            .bounded("GET", redis::cmd("GET").arg(&key).query_async(&mut conn))
            .await?;

        match raw {
            Some(value) => {
                debug!("Cache hit: {}", key);
                decode_turns(&value).map(Some)
            }
            None => {
                debug!("Cache miss: {}", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, user_id: &str, turns: &[Turn], ttl: Duration) -> CacheResult<()> {
        let key = self.config.history_key(user_id);
        let value = encode_turns(turns)?;
        // EX takes whole seconds and rejects 0
        let ttl_secs = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();

        self.bounded::<(), _>(
            "SET",
            redis::cmd("SET")
                .arg(&key)
                .arg(&value)
                .arg("EX")
                .arg(ttl_secs)
                .query_async(&mut conn),
        )
        .await?;

        debug!("Cached {} turns under {} for {}s", turns.len(), key, ttl_secs);
        Ok(())
    }

    async fn invalidate(&self, user_id: &str) -> CacheResult<()> {
        let key = self.config.history_key(user_id);
        let mut conn = self.conn.clone();

        let removed: u64 = self
            .bounded("DEL", redis::cmd("DEL").arg(&key).query_async(&mut conn))
            .await?;

        debug!("Invalidated {} ({} key removed)", key, removed);
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        let mut conn = self.conn.clone();

        match self
            .bounded::<String, _>("PING", redis::cmd("PING").query_async(&mut conn))
            .await
        {
            Ok(reply) if reply == "PONG" => HealthStatus::Healthy,
            Ok(reply) => {
                warn!("Unexpected PING reply from Redis: {}", reply);
                HealthStatus::Degraded
            }
            Err(e) => {
                warn!("Redis health check failed: {}", e);
                HealthStatus::Unhealthy
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
