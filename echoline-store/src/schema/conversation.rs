//! Conversation node CRUD operations
//!
//! Each user owns exactly one `(:Conversation {user_id})` node. The turn list
//! is stored as a JSON string property, so a write always replaces the whole
//! history.

use crate::error::{Result, StoreError};
use crate::schema::types::{ConversationRecord, Turn};
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph};

/// Create the uniqueness constraint on `Conversation.user_id` if missing
///
/// Requires Neo4j 5 constraint syntax.
pub async fn ensure_conversation_constraint(graph: &Graph) -> Result<()> {
    let cypher = query(
        "CREATE CONSTRAINT conversation_user_id IF NOT EXISTS
         FOR (c:Conversation) REQUIRE c.user_id IS UNIQUE",
    );

    graph.run(cypher).await.map_err(|e| {
        StoreError::QueryError(format!("Failed to create conversation constraint: {}", e))
    })?;

    Ok(())
}

/// Store the full history for a user, replacing whatever was there
///
/// `created_at` is only written when the node is first created.
///
/// # Arguments
/// * `graph` - Neo4j graph connection
/// * `user_id` - Owner of the conversation
/// * `turns` - Complete ordered history
pub async fn upsert_conversation(graph: &Graph, user_id: &str, turns: &[Turn]) -> Result<()> {
    let turns_json = serde_json::to_string(turns)
        .map_err(|e| StoreError::SerializationError(format!("Failed to serialize turns: {}", e)))?;
    let now = Utc::now().to_rfc3339();

    let cypher = query(
        "MERGE (c:Conversation {user_id: $user_id})
         ON CREATE SET c.created_at = $now
         SET c.turns = $turns,
             c.message_count = $message_count,
             c.updated_at = $now",
    )
    .param("user_id", user_id.to_string())
    .param("turns", turns_json)
    .param("message_count", turns.len() as i64)
    .param("now", now);

    graph
        .run(cypher)
        .await
        .map_err(|e| StoreError::QueryError(format!("Failed to store conversation: {}", e)))?;

    Ok(())
}

/// Get the conversation for a user
///
/// # Returns
/// * `Ok(Some(ConversationRecord))` if the user has a conversation node
/// * `Ok(None)` if not found
/// * `Err(StoreError)` on failure
pub async fn get_conversation(graph: &Graph, user_id: &str) -> Result<Option<ConversationRecord>> {
    let cypher = query("MATCH (c:Conversation {user_id: $user_id}) RETURN c")
        .param("user_id", user_id.to_string());

    let mut result = graph
        .execute(cypher)
        .await
        .map_err(|e| StoreError::QueryError(format!("Failed to get conversation: {}", e)))?;

    let Some(row) = result
        .next()
        .await
        .map_err(|e| StoreError::QueryError(format!("Failed to read conversation: {}", e)))?
    else {
        return Ok(None);
    };

    let node: neo4rs::Node = row.get("c").map_err(|e| {
        StoreError::QueryError(format!("Failed to extract conversation node: {}", e))
    })?;

    let turns_json: String = node.get("turns").map_err(|e| {
        StoreError::QueryError(format!("Failed to extract conversation turns: {}", e))
    })?;

    let turns: Vec<Turn> = serde_json::from_str(&turns_json).map_err(|e| {
        StoreError::SerializationError(format!("Failed to parse turns JSON: {}", e))
    })?;

    let created_at = parse_timestamp(&node, "created_at")?;
    let updated_at = parse_timestamp(&node, "updated_at")?;

    Ok(Some(ConversationRecord {
        user_id: user_id.to_string(),
        message_count: turns.len(),
        turns,
        created_at,
        updated_at,
    }))
}

fn parse_timestamp(node: &neo4rs::Node, field: &str) -> Result<DateTime<Utc>> {
    let raw: String = node.get(field).map_err(|e| {
        StoreError::QueryError(format!("Failed to extract conversation {}: {}", field, e))
    })?;

    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryError(format!("Failed to parse {} datetime: {}", field, e)))
}
