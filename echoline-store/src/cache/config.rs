//! History cache settings

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Namespace used when none is configured
pub const DEFAULT_KEY_PREFIX: &str = "chat_history";

/// Settings read by the cache backends
///
/// There is no TTL here: a `set` call always stores with the TTL its caller
/// passes (see [`apply_jitter`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Keys look like `{key_prefix}:{user_id}`
    pub key_prefix: String,

    // Memory backend
    pub max_entries: usize,
    pub max_bytes: usize,
    pub sweep_expired: bool,
    pub sweep_interval: Duration,
    /// Least recently read goes first when full; otherwise oldest write
    pub evict_lru: bool,

    // Redis backend
    pub command_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_entries: 10_000,
            max_bytes: 64 * 1024 * 1024,
            sweep_expired: true,
            sweep_interval: Duration::from_secs(300),
            evict_lru: true,
            command_timeout: Duration::from_millis(500),
        }
    }
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let problem = if self.key_prefix.is_empty() {
            "key_prefix must not be empty"
        } else if self.max_entries == 0 || self.max_bytes == 0 {
            "memory cache limits must be positive"
        } else if self.command_timeout.is_zero() {
            "command_timeout must be positive"
        } else {
            return Ok(());
        };

        Err(StoreError::ConfigError(problem.to_string()))
    }

    pub fn history_key(&self, user_id: &str) -> String {
        format!("{}:{}", self.key_prefix, user_id)
    }
}

/// Spread `ttl` uniformly over `ttl * (1 ± jitter)`, floored at one second
pub fn apply_jitter(ttl: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return ttl;
    }

    let spread = rand::random::<f64>() * 2.0 - 1.0;
    let secs = ttl.as_secs_f64() * (1.0 + spread * jitter);
    Duration::from_secs_f64(secs.max(1.0))
}

/// Chainable overrides on top of [`CacheConfig::default`]
#[derive(Debug, Clone)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    pub fn max_entries(mut self, max: usize) -> Self {
        self.config.max_entries = max;
        self
    }

    pub fn max_bytes(mut self, max: usize) -> Self {
        self.config.max_bytes = max;
        self
    }

    pub fn sweep_expired(mut self, on: bool) -> Self {
        self.config.sweep_expired = on;
        self
    }

    pub fn sweep_interval(mut self, every: Duration) -> Self {
        self.config.sweep_interval = every;
        self
    }

    pub fn evict_lru(mut self, on: bool) -> Self {
        self.config.evict_lru = on;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}
