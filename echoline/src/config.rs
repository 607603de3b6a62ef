//! Runtime configuration and store construction
//!
//! Every option is a CLI flag with an `ECHOLINE_*` environment fallback, so a
//! `.env` file loaded at startup can configure the whole process. Neo4j reads
//! its own `NEO4J_*` variables.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use echoline_store::cache::start_auto_cleanup;
use echoline_store::{
    CacheConfig, CacheStore, DurableStore, FileConversationStore, MemoryCache,
    MemoryConversationStore, Neo4jConfig, Neo4jConversationStore, StoreError,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::history::{HistoryConfig, HistoryManager};
use crate::responder::EchoResponder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DurableBackend {
    Memory,
    File,
    Neo4j,
}

/// Store and history settings shared by every subcommand
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// Cache backend
    #[arg(long, env = "ECHOLINE_CACHE", value_enum, default_value_t = CacheBackend::Memory)]
    pub cache: CacheBackend,

    /// Redis URL (used with --cache redis)
    #[arg(long, env = "ECHOLINE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Cache time-to-live in seconds
    #[arg(long, env = "ECHOLINE_CACHE_TTL_SECS", default_value_t = 86_400)]
    pub cache_ttl_secs: u64,

    /// Randomise each cache TTL by up to this fraction (0.0 - 1.0)
    #[arg(long, env = "ECHOLINE_CACHE_TTL_JITTER", default_value_t = 0.0)]
    pub cache_ttl_jitter: f64,

    /// Keep only the most recent N turns in the cache
    #[arg(long, env = "ECHOLINE_CACHE_MAX_TURNS")]
    pub cache_max_turns: Option<usize>,

    /// Durable store backend
    #[arg(long, env = "ECHOLINE_DURABLE", value_enum, default_value_t = DurableBackend::File)]
    pub durable: DurableBackend,

    /// Data directory for the file store
    #[arg(short, long, env = "ECHOLINE_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Fail a request whose reply takes longer than this
    #[arg(long, env = "ECHOLINE_RESPONDER_TIMEOUT_MS")]
    pub responder_timeout_ms: Option<u64>,

    /// Allow concurrent requests for the same user to interleave
    #[arg(long, env = "ECHOLINE_NO_SERIALIZE")]
    pub no_serialize: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache: CacheBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            cache_ttl_secs: 86_400,
            cache_ttl_jitter: 0.0,
            cache_max_turns: None,
            durable: DurableBackend::File,
            data_dir: PathBuf::from("./data"),
            responder_timeout_ms: None,
            no_serialize: false,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> std::result::Result<(), StoreError> {
        if self.cache_ttl_secs == 0 {
            return Err(StoreError::ConfigError("cache TTL must be greater than 0".to_string()));
        }

        if !(0.0..=1.0).contains(&self.cache_ttl_jitter) {
            return Err(StoreError::ConfigError(
                "cache TTL jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.cache_max_turns == Some(0) {
            return Err(StoreError::ConfigError(
                "cache max turns must be greater than 0".to_string(),
            ));
        }

        if self.responder_timeout_ms == Some(0) {
            return Err(StoreError::ConfigError(
                "responder timeout must be greater than 0".to_string(),
            ));
        }

        #[cfg(not(feature = "redis"))]
        if self.cache == CacheBackend::Redis {
            return Err(StoreError::ConfigError(
                "redis cache requested but echoline was built without the `redis` feature"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
    }

    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_ttl_jitter: self.cache_ttl_jitter,
            max_cached_turns: self.cache_max_turns,
            serialize_per_user: !self.no_serialize,
            responder_timeout: self.responder_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Build the configured cache, starting the expiry sweep for the memory backend
    pub async fn build_cache(&self) -> Result<Arc<dyn CacheStore>> {
        let config = self.cache_config();
        config.validate()?;

        match self.cache {
            CacheBackend::Memory => {
                let cache = Arc::new(MemoryCache::new(config));
                if cache.config().sweep_expired {
                    tokio::spawn(start_auto_cleanup(cache.clone()));
                }
                Ok(cache)
            }
            #[cfg(feature = "redis")]
            CacheBackend::Redis => {
                let cache = echoline_store::RedisCache::connect(&self.redis_url, config)
                    .await
                    .with_context(|| format!("Failed to connect to Redis at {}", self.redis_url))?;
                Ok(Arc::new(cache))
            }
            #[cfg(not(feature = "redis"))]
            CacheBackend::Redis => anyhow::bail!("echoline was built without the `redis` feature"),
        }
    }

    pub async fn build_durable(&self) -> Result<Arc<dyn DurableStore>> {
        match self.durable {
            DurableBackend::Memory => Ok(Arc::new(MemoryConversationStore::new())),
            DurableBackend::File => {
                let store = FileConversationStore::open(&self.data_dir)
                    .await
                    .with_context(|| format!("Failed to open data directory {:?}", self.data_dir))?;
                Ok(Arc::new(store))
            }
            DurableBackend::Neo4j => {
                let config = Neo4jConfig::from_env();
                let uri = config.uri.clone();
                let store = Neo4jConversationStore::connect(config)
                    .await
                    .with_context(|| format!("Failed to connect to Neo4j at {}", uri))?;
                Ok(Arc::new(store))
            }
        }
    }

    /// Validate, build both stores and wire them into a manager with the echo responder
    pub async fn build_manager(&self) -> Result<HistoryManager> {
        self.validate()?;

        let cache = self.build_cache().await?;
        let durable = self.build_durable().await?;
        info!(
            "Stores ready: cache={}, durable={}",
            cache.backend_name(),
            durable.backend_name()
        );

        Ok(HistoryManager::new(
            cache,
            durable,
            Arc::new(EchoResponder),
            self.history_config(),
        ))
    }
}
