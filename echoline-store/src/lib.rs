//! # echoline-store
//!
//! Storage adapters for echoline conversation histories.
//!
//! ## Two tiers
//!
//! - [`CacheStore`]: volatile, TTL-bound projection of recent turns. Failures
//!   surface as [`CacheUnavailable`] and are never fatal to callers.
//! - [`DurableStore`]: the authoritative full history per user. Failures
//!   surface as [`StoreError`].
//!
//! ## Backends
//!
//! | Tier    | Backend                     | Notes                              |
//! |---------|-----------------------------|------------------------------------|
//! | cache   | [`MemoryCache`]             | TTL + LRU, in process              |
//! | cache   | `RedisCache`                | feature `redis`                    |
//! | durable | [`MemoryConversationStore`] | tests and throwaway runs           |
//! | durable | [`FileConversationStore`]   | one JSON document per user         |
//! | durable | [`Neo4jConversationStore`]  | `(:Conversation {user_id})` nodes  |
//!
//! ## Example
//!
//! ```no_run
//! use echoline_store::{DurableStore, FileConversationStore, Turn};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = FileConversationStore::open("./data").await?;
//!
//!     store.set("u1", &[Turn::user("hi"), Turn::assistant("Echo: hi")]).await?;
//!     let turns = store.get("u1").await?.unwrap_or_default();
//!     println!("{} turns stored", turns.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Neo4j health checks
//!
//! [`Neo4jClient::probe`] runs `CALL db.ping()` with retries and falls back to
//! `RETURN 1` on servers that lack the procedure.

pub mod cache;
pub mod connection;
pub mod durable;
pub mod error;
pub mod health;
pub mod schema;

// Re-export main types for convenience
#[cfg(feature = "redis")]
pub use cache::RedisCache;
pub use cache::{
    apply_jitter, CacheConfig, CacheConfigBuilder, CacheResult, CacheStats, CacheStore, MemoryCache,
};
pub use connection::{Neo4jClient, Neo4jConfig};
pub use durable::{
    DurableStore, FileConversationStore, MemoryConversationStore, Neo4jConversationStore,
};
pub use error::{CacheUnavailable, Result, StoreError};
pub use health::{HealthStatus, Probe, ProbePolicy, ProbeReport};
pub use schema::{ConversationRecord, Role, Turn};
