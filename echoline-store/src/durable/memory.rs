//! In-process durable store

use crate::durable::DurableStore;
use crate::error::Result;
use crate::schema::{ConversationRecord, Turn};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Durable store backed by a map; contents die with the process
#[derive(Default)]
pub struct MemoryConversationStore {
    records: RwLock<HashMap<String, ConversationRecord>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full record for a user, including timestamps
    pub async fn record(&self, user_id: &str) -> Option<ConversationRecord> {
        self.records.read().await.get(user_id).cloned()
    }

    /// Number of stored conversations
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryConversationStore {
    async fn get(&self, user_id: &str) -> Result<Option<Vec<Turn>>> {
        let records = self.records.read().await;
        Ok(records.get(user_id).map(|r| r.turns.clone()))
    }

    async fn set(&self, user_id: &str, turns: &[Turn]) -> Result<()> {
        let mut records = self.records.write().await;

        match records.get_mut(user_id) {
            Some(record) => record.replace_turns(turns.to_vec()),
            None => {
                records.insert(
                    user_id.to_string(),
                    ConversationRecord::new(user_id, turns.to_vec()),
                );
            }
        }

        debug!("Stored {} turns for user {}", turns.len(), user_id);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
