//! Neo4j-backed durable store

use crate::connection::{Neo4jClient, Neo4jConfig};
use crate::durable::DurableStore;
use crate::error::Result;
use crate::health::HealthStatus;
use crate::schema::{self, ConversationRecord, Turn};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Durable store keeping one `Conversation` node per user
pub struct Neo4jConversationStore {
    client: Neo4jClient,
}

impl Neo4jConversationStore {
    /// Connect and make sure the `user_id` uniqueness constraint exists
    pub async fn connect(config: Neo4jConfig) -> Result<Self> {
        let client = Neo4jClient::connect(config).await?;
        Self::from_client(client).await
    }

    /// Wrap an existing client
    pub async fn from_client(client: Neo4jClient) -> Result<Self> {
        client
            .bounded(
                "ensure conversation constraint",
                schema::ensure_conversation_constraint(client.graph()),
            )
            .await?;
        info!("Neo4j conversation store ready");
        Ok(Self { client })
    }

    pub fn client(&self) -> &Neo4jClient {
        &self.client
    }

    /// Full record for a user, including timestamps
    pub async fn record(&self, user_id: &str) -> Result<Option<ConversationRecord>> {
        self.client
            .bounded(
                "load conversation",
                schema::get_conversation(self.client.graph(), user_id),
            )
            .await
    }
}

#[async_trait]
impl DurableStore for Neo4jConversationStore {
    async fn get(&self, user_id: &str) -> Result<Option<Vec<Turn>>> {
        Ok(self.record(user_id).await?.map(|r| r.turns))
    }

    async fn set(&self, user_id: &str, turns: &[Turn]) -> Result<()> {
        self.client
            .bounded(
                "store conversation",
                schema::upsert_conversation(self.client.graph(), user_id, turns),
            )
            .await?;
        debug!("Stored {} turns for user {} in Neo4j", turns.len(), user_id);
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        let report = self.client.probe().await;
        if let Some(error) = &report.error {
            warn!("Neo4j health check failed after {} attempts: {}", report.attempts, error);
        }
        report.status
    }

    fn backend_name(&self) -> &'static str {
        "neo4j"
    }
}
