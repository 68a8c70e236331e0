use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use debrief_core::domain::interview::{InterviewMessage, MessageRole};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl From<&InterviewMessage> for ChatMessage {
    fn from(message: &InterviewMessage) -> Self {
        Self { role: message.role, content: message.content.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: String, messages: Vec<ChatMessage>, max_tokens: u32) -> Self {
        Self { system, messages, max_tokens }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("model transport failed: {0}")]
    Transport(String),
    #[error("model API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("model response could not be decoded: {0}")]
    Decode(String),
    #[error("model stream failed: {0}")]
    Stream(String),
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("stream consumer went away")]
    Cancelled,
}

/// A language model that answers a system prompt plus an ordered history.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the first text block of the reply, or `None` when the reply
    /// carried no text.
    async fn complete(&self, request: CompletionRequest) -> Result<Option<String>, LlmError>;

    /// Sends text deltas in arrival order and returns their concatenation.
    /// Fails with [`LlmError::Cancelled`] once `deltas` has no receiver.
    async fn stream(
        &self,
        request: CompletionRequest,
        deltas: mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        let text = self.complete(request).await?.unwrap_or_default();
        if !text.is_empty() {
            deltas.send(text.clone()).await.map_err(|_| LlmError::Cancelled)?;
        }
        Ok(text)
    }
}
