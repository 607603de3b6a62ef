//! Type definitions for conversation data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message sent by the caller
    User,
    /// Reply produced by the responder
    Assistant,
}

impl Role {
    /// Convert role to its wire/storage string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message unit in a conversation
///
/// Turns are never mutated after creation; a conversation only grows by
/// appending new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Durable conversation document, one per user id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Caller-supplied user identifier
    pub user_id: String,
    /// Full ordered history
    pub turns: Vec<Turn>,
    /// Number of turns, kept alongside for cheap inspection
    pub message_count: usize,
    /// When the conversation was first stored
    pub created_at: DateTime<Utc>,
    /// When the conversation was last replaced
    pub updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    /// Create a fresh record for a user
    pub fn new(user_id: impl Into<String>, turns: Vec<Turn>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            message_count: turns.len(),
            turns,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the stored turns, keeping the creation time
    pub fn replace_turns(&mut self, turns: Vec<Turn>) {
        self.message_count = turns.len();
        self.turns = turns;
        self.updated_at = Utc::now();
    }
}
