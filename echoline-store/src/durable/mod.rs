//! # Durable Conversation Stores
//!
//! The durable store is the authoritative record of every conversation: one
//! document per user id, never expiring, always written as a full replace of
//! the history the caller holds.
//!
//! ## Backends
//!
//! - [`MemoryConversationStore`]: process-local map, for tests and throwaway runs
//! - [`FileConversationStore`]: one JSON document per user on disk
//! - [`Neo4jConversationStore`]: one `Conversation` node per user in Neo4j
//!
//! ## Example
//!
//! ```rust
//! use echoline_store::{DurableStore, MemoryConversationStore, Turn};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = MemoryConversationStore::new();
//!
//! store.set("u1", &[Turn::user("hi"), Turn::assistant("Echo: hi")]).await?;
//!
//! let turns = store.get("u1").await?.unwrap_or_default();
//! assert_eq!(turns.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod file;
pub mod memory;
pub mod neo4j;

pub use file::FileConversationStore;
pub use memory::MemoryConversationStore;
pub use neo4j::Neo4jConversationStore;

use crate::error::Result;
use crate::health::HealthStatus;
use crate::schema::Turn;
use async_trait::async_trait;

/// Persistent record store holding full conversation histories
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Load the full history for a user
    ///
    /// `Ok(None)` means no document exists. An empty stored document is
    /// returned as `Ok(Some(vec![]))`; callers treat both the same.
    async fn get(&self, user_id: &str) -> Result<Option<Vec<Turn>>>;

    /// Replace the stored history for a user with `turns`
    async fn set(&self, user_id: &str, turns: &[Turn]) -> Result<()>;

    /// Report store health
    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Healthy
    }

    /// Short backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}
