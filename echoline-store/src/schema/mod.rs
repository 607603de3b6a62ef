//! Conversation schema module
//!
//! This module defines the conversation data model shared by every store
//! and the Neo4j operations for the `Conversation` node.

pub mod conversation;
pub mod types;

pub use conversation::{ensure_conversation_constraint, get_conversation, upsert_conversation};
pub use types::{ConversationRecord, Role, Turn};
