//! # History Cache
//!
//! The cache holds a volatile, possibly truncated projection of each user's
//! conversation so the common read path never touches the durable store.
//!
//! ## Contract
//!
//! - `get` returns `None` for a missing key and for an expired one; an expired
//!   value is never handed out
//! - `set` overwrites unconditionally and restarts the TTL
//! - `invalidate` deletes the key so the next `get` misses
//! - every failure is a [`CacheUnavailable`]; callers treat it as a miss on
//!   read and skip it on write
//!
//! ## Backends
//!
//! - [`MemoryCache`]: in-process TTL cache with LRU eviction and size limits
//! - `RedisCache` (feature `redis`): `SET ... EX` / `GET` against Redis
//!
//! ## Example
//!
//! ```rust
//! use echoline_store::cache::{CacheConfig, CacheStore, MemoryCache};
//! use echoline_store::Turn;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CacheConfig::builder()
//!     .key_prefix("chat_history")
//!     .max_entries(10_000)
//!     .build();
//!
//! let cache = MemoryCache::new(config);
//!
//! cache.set("u1", &[Turn::user("hi")], Duration::from_secs(60)).await?;
//!
//! if let Some(turns) = cache.get("u1").await? {
//!     println!("Cache hit: {} turns", turns.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod stats;

pub use config::{apply_jitter, CacheConfig, CacheConfigBuilder, DEFAULT_KEY_PREFIX};
pub use entry::{CacheEntry, CacheKey, CacheValue};
pub use memory::{start_auto_cleanup, MemoryCache};
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;
pub use stats::CacheStats;

use crate::error::CacheUnavailable;
use crate::health::HealthStatus;
use crate::schema::Turn;
use async_trait::async_trait;
use std::time::Duration;

/// Result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheUnavailable>;

/// Volatile key-value store for recent conversation turns
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Cached turns for a user, or `None` on miss or expiry
    async fn get(&self, user_id: &str) -> CacheResult<Option<Vec<Turn>>>;

    /// Store `turns` for a user, replacing any previous value, expiring after `ttl`
    async fn set(&self, user_id: &str, turns: &[Turn], ttl: Duration) -> CacheResult<()>;

    /// Drop a user's cached turns; removing an absent key is not an error
    async fn invalidate(&self, user_id: &str) -> CacheResult<()>;

    /// Report cache health
    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Healthy
    }

    /// Short backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}

pub(crate) fn encode_turns(turns: &[Turn]) -> CacheResult<CacheValue> {
    serde_json::to_string(turns)
        .map_err(|e| CacheUnavailable(format!("Failed to serialize turns: {}", e)))
}

pub(crate) fn decode_turns(value: &str) -> CacheResult<Vec<Turn>> {
    serde_json::from_str(value)
        .map_err(|e| CacheUnavailable(format!("Failed to parse cached turns: {}", e)))
}
