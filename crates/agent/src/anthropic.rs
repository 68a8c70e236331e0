use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use debrief_core::config::LlmConfig;

use crate::llm::{CompletionRequest, LlmClient, LlmError};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        }
    }

    fn request_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
            .collect();

        json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "system": request.system,
            "messages": messages,
            "stream": stream,
        })
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body_text = response.text().await.unwrap_or_default();
        Err(LlmError::Api { status: status.as_u16(), message: api_error_message(&body_text) })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Option<String>, LlmError> {
        let response = self.post(&self.request_body(&request, false)).await?;
        let body_text =
            response.text().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        let parsed: MessagesResponse = serde_json::from_str(&body_text)
            .map_err(|error| LlmError::Decode(format!("failed to parse response: {error}")))?;

        Ok(parsed.content.into_iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        }))
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        deltas: mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        let response = self.post(&self.request_body(&request, true)).await?;
        read_event_stream(response.bytes_stream(), &deltas).await
    }
}

/// Forwards text deltas from a Messages API event stream until `message_stop`.
///
/// Lines are split on raw bytes so a UTF-8 sequence cut across chunks is
/// decoded whole. A stream that closes before `message_stop` is an error.
async fn read_event_stream<S, B, E>(
    mut stream: S,
    deltas: &mpsc::Sender<String>,
) -> Result<String, LlmError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut buffer: Vec<u8> = Vec::new();
    let mut full_text = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| LlmError::Transport(error.to_string()))?;
        buffer.extend_from_slice(chunk.as_ref());

        while let Some(line_end) = buffer.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw[..line_end]);

            match parse_sse_line(line.trim_end_matches('\r'))? {
                SseLine::TextDelta(text) => {
                    full_text.push_str(&text);
                    deltas.send(text).await.map_err(|_| LlmError::Cancelled)?;
                }
                SseLine::Stop => {
                    debug!(event_name = "llm.stream_completed", chars = full_text.len());
                    return Ok(full_text);
                }
                SseLine::Ignored => {}
            }
        }
    }

    Err(LlmError::Stream("stream ended before message_stop".to_string()))
}

#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    TextDelta(String),
    Stop,
    Ignored,
}

fn parse_sse_line(line: &str) -> Result<SseLine, LlmError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Ignored);
    };
    let event: StreamEvent = serde_json::from_str(data.trim())
        .map_err(|error| LlmError::Decode(format!("invalid stream event: {error}")))?;

    match event {
        StreamEvent::ContentBlockDelta { delta: Delta::TextDelta { text } } => {
            Ok(SseLine::TextDelta(text))
        }
        StreamEvent::MessageStop => Ok(SseLine::Stop),
        StreamEvent::Error { error } => Err(LlmError::Stream(error.message)),
        _ => Ok(SseLine::Ignored),
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta {
        delta: Delta,
    },
    MessageStop,
    Error {
        error: ErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
