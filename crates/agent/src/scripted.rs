use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::llm::{CompletionRequest, LlmClient, LlmError};

/// One canned model answer.
#[derive(Clone, Debug)]
pub enum ScriptedReply {
    Text(String),
    /// A reply with no text block.
    NoText,
    Chunks(Vec<String>),
    ChunksThenError(Vec<String>, LlmError),
    Error(LlmError),
    /// Never answers.
    Hang,
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Chunks(chunks.into_iter().map(Into::into).collect())
    }
}

/// Deterministic [`LlmClient`] that replays queued replies in order and
/// records every request it receives.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self { replies: Mutex::new(replies.into_iter().collect()), requests: Mutex::default() }
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push_back(reply);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn next(&self, request: CompletionRequest) -> Result<ScriptedReply, LlmError> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(request);
        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| LlmError::Api { status: 500, message: "no scripted reply left".to_string() })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Option<String>, LlmError> {
        match self.next(request)? {
            ScriptedReply::Text(text) => Ok(Some(text)),
            ScriptedReply::NoText => Ok(None),
            ScriptedReply::Chunks(chunks) => Ok(Some(chunks.concat())),
            ScriptedReply::ChunksThenError(_, error) | ScriptedReply::Error(error) => Err(error),
            ScriptedReply::Hang => std::future::pending().await,
        }
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        deltas: mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        let (chunks, failure) = match self.next(request)? {
            ScriptedReply::Text(text) => (vec![text], None),
            ScriptedReply::NoText => (Vec::new(), None),
            ScriptedReply::Chunks(chunks) => (chunks, None),
            ScriptedReply::ChunksThenError(chunks, error) => (chunks, Some(error)),
            ScriptedReply::Error(error) => (Vec::new(), Some(error)),
            ScriptedReply::Hang => return std::future::pending().await,
        };

        let mut full_text = String::new();
        for chunk in chunks {
            full_text.push_str(&chunk);
            deltas.send(chunk).await.map_err(|_| LlmError::Cancelled)?;
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(full_text),
        }
    }
}
