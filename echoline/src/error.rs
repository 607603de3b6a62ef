//! Request-level errors
//!
//! Cache failures never reach this type: the history manager absorbs them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use echoline_store::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::responder::ResponderError;

#[derive(Error, Debug)]
pub enum ChatError {
    /// Missing or blank `user_id` / `message`
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reply generation failed; nothing was persisted
    #[error(transparent)]
    Responder(#[from] ResponderError),

    /// The durable write failed; the conversation did not advance
    #[error("Failed to persist conversation: {0}")]
    Persistence(#[source] StoreError),
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ChatError::Responder(_) => StatusCode::BAD_GATEWAY,
            ChatError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to callers
    pub fn public_message(&self) -> String {
        match self {
            ChatError::InvalidInput(reason) => reason.clone(),
            ChatError::Responder(_) => "Failed to generate a reply".to_string(),
            ChatError::Persistence(_) => "Failed to save the conversation".to_string(),
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Chat request failed: {}", self);
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ChatError::InvalidInput("message must not be empty".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ChatError::Responder(ResponderError::Timeout(Duration::from_secs(1))).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ChatError::Persistence(StoreError::QueryError("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_public_message_hides_store_details() {
        let err = ChatError::Persistence(StoreError::ConnectionError(
            "bolt://db-internal:7687 refused".into(),
        ));
        assert!(!err.public_message().contains("db-internal"));
        assert!(err.to_string().contains("db-internal"));
    }
}
