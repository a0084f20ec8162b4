//! Completion provider integrations
//!
//! The rest of the crate only sees [`CompletionClient`]: hand it the full
//! role-tagged message sequence, get the assistant's next reply back.

mod openai_compat;
mod retry;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::conversation::Message;

pub use openai_compat::OpenAiCompatClient;
pub use retry::{RetryPolicy, RetryingClient};

#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimit(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl CompletionError {
    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, CompletionError::Network(_) | CompletionError::RateLimit(_))
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CompletionError::MalformedResponse(err.to_string())
        } else if err.is_timeout() {
            CompletionError::Network(format!("request timed out: {err}"))
        } else {
            CompletionError::Network(err.to_string())
        }
    }
}

/// Produces the assistant's next message for a conversation.
///
/// Implementations must treat `messages` as read-only input and must not keep
/// them after the call returns.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError>;
}
