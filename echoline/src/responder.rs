//! Reply generation
//!
//! A [`Responder`] turns the incoming message (and the history leading up to
//! it) into the assistant's reply. The history manager calls it exactly once
//! per request and never retries.

use async_trait::async_trait;
use echoline_store::Turn;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResponderError {
    #[error("Responder failed: {0}")]
    Failed(String),

    #[error("Responder timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait Responder: Send + Sync {
    /// Produce a reply to `message`
    ///
    /// `history` already ends with the user turn carrying `message`.
    async fn generate(&self, message: &str, history: &[Turn]) -> Result<String, ResponderError>;
}

/// Replies with `Echo: {message}`
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoResponder;

#[async_trait]
impl Responder for EchoResponder {
    async fn generate(&self, message: &str, _history: &[Turn]) -> Result<String, ResponderError> {
        Ok(format!("Echo: {}", message))
    }
}
