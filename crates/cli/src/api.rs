use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use debrief_core::domain::deal::DealId;
use debrief_core::domain::interview::{InterviewMessage, SessionId};
use debrief_core::domain::report::StructuredReport;

use crate::controller::{AssistantReply, CapabilityError, InterviewApi, StartedSession};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Talks to a running `debrief-server`.
pub struct HttpInterviewApi {
    client: reqwest::Client,
    base_url: String,
    streaming: bool,
}

impl HttpInterviewApi {
    pub fn new(base_url: &str, streaming: bool) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| CapabilityError::Network(error.to_string()))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), streaming })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, CapabilityError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(path, body).await?;
        response.json::<T>().await.map_err(|error| CapabilityError::Decode(error.to_string()))
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, CapabilityError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|error| CapabilityError::Network(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let raw = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&raw)
            .map(|body| body.error)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("request failed").to_string());
        Err(CapabilityError::Api { status: status.as_u16(), message })
    }

    async fn stream_turn(
        &self,
        session_id: &SessionId,
        transcript: &str,
    ) -> Result<AssistantReply, CapabilityError> {
        let response = self
            .send("/api/interview/message/stream", &TurnBody { session_id, transcript })
            .await?;

        let mut bytes = response.bytes_stream();
        let mut buffer = Vec::new();
        let mut tokens = 0usize;
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|error| CapabilityError::Stream(error.to_string()))?;
            buffer.extend_from_slice(&chunk);

            for frame in drain_frames(&mut buffer) {
                match frame? {
                    StreamFrame::Token {} => tokens += 1,
                    StreamFrame::Done { content, interview_complete } => {
                        debug!(event_name = "api.stream_done", tokens);
                        return Ok(AssistantReply { response: content, interview_complete });
                    }
                    StreamFrame::Error { content } => return Err(CapabilityError::Stream(content)),
                }
            }
        }

        Err(CapabilityError::Stream("stream ended without a result".to_string()))
    }
}

#[async_trait]
impl InterviewApi for HttpInterviewApi {
    async fn start(&self, deal_id: &DealId) -> Result<StartedSession, CapabilityError> {
        self.post("/api/interview/start", &StartBody { deal_id: &deal_id.0 }).await
    }

    async fn send_turn(
        &self,
        session_id: &SessionId,
        transcript: &str,
    ) -> Result<AssistantReply, CapabilityError> {
        if self.streaming {
            return self.stream_turn(session_id, transcript).await;
        }
        self.post("/api/interview/message", &TurnBody { session_id, transcript }).await
    }

    async fn end(&self, session_id: &SessionId) -> Result<Vec<InterviewMessage>, CapabilityError> {
        let ended: TranscriptBody =
            self.post("/api/interview/end", &SessionBody { session_id }).await?;
        Ok(ended.transcript)
    }

    async fn generate_report(
        &self,
        session_id: &SessionId,
    ) -> Result<StructuredReport, CapabilityError> {
        let generated: ReportBody =
            self.post("/api/report/generate", &SessionBody { session_id }).await?;
        Ok(generated.report)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartBody<'a> {
    deal_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TurnBody<'a> {
    session_id: &'a SessionId,
    transcript: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody<'a> {
    session_id: &'a SessionId,
}

#[derive(Deserialize)]
struct TranscriptBody {
    transcript: Vec<InterviewMessage>,
}

#[derive(Deserialize)]
struct ReportBody {
    report: StructuredReport,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamFrame {
    Token {},
    Done {
        content: String,
        #[serde(rename = "interviewComplete")]
        interview_complete: bool,
    },
    Error {
        content: String,
    },
}

/// Removes every complete `data: ...\n\n` frame from `buffer`, leaving a
/// trailing partial frame in place.
fn drain_frames(buffer: &mut Vec<u8>) -> Vec<Result<StreamFrame, CapabilityError>> {
    let mut frames = Vec::new();
    while let Some(end) = buffer.windows(2).position(|pair| pair == b"\n\n") {
        let raw: Vec<u8> = buffer.drain(..end + 2).collect();
        let frame = String::from_utf8_lossy(&raw);
        let payload: String = frame
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();
        if payload.is_empty() {
            continue;
        }
        frames.push(
            serde_json::from_str(&payload).map_err(|error| CapabilityError::Decode(error.to_string())),
        );
    }
    frames
}
