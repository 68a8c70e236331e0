use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use debrief_agent::{StreamEvent, TurnReply};
use debrief_core::domain::deal::{DealContext, DealId};
use debrief_core::domain::interview::{InterviewMessage, SessionId};

use super::AppState;
use crate::errors::{json_rejection, require_id, ApiError};

const STREAM_BUFFER: usize = 32;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub deal_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub session_id: String,
    pub greeting: String,
    pub deal_context: DealContext,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub session_id: String,
    pub transcript: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub transcript: Vec<InterviewMessage>,
}

pub async fn start_interview(
    State(state): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<StartResponse>, ApiError> {
    let Json(request) = payload.map_err(json_rejection)?;
    require_id(&request.deal_id, "dealId")?;

    let detail = state.crm.get_deal(&request.deal_id).await?;
    let deal_context = DealContext::from_detail(&detail);
    let mut session = state
        .orchestrator
        .start_session(DealId(request.deal_id), deal_context.clone())
        .await?;
    let greeting = state.orchestrator.greeting(&mut session).await?;

    Ok(Json(StartResponse { session_id: session.id().0.clone(), greeting, deal_context }))
}

pub async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<TurnReply>, ApiError> {
    let Json(request) = payload.map_err(json_rejection)?;
    require_id(&request.session_id, "sessionId")?;

    let reply = state
        .orchestrator
        .send_message(&SessionId(request.session_id), &request.transcript)
        .await?;
    Ok(Json(reply))
}

/// Streams the turn as `data: <json>\n\n` frames. The turn runs on its own
/// task so a disconnecting client cancels the model call instead of the turn.
pub async fn stream_message(
    State(state): State<AppState>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(json_rejection)?;
    require_id(&request.session_id, "sessionId")?;

    let (sink, events) = mpsc::channel(STREAM_BUFFER);
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let session_id = SessionId(request.session_id);
        // The outcome already went out as the terminal frame.
        if let Err(error) =
            orchestrator.stream_message(&session_id, &request.transcript, sink).await
        {
            debug!(event_name = "interview.stream_ended_with_error", session_id = %session_id, error = %error);
        }
    });

    let frames = futures_util::stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        Some((Ok::<_, Infallible>(sse_frame(&event)), events))
    });
    Ok((
        [(header::CONTENT_TYPE, "text/event-stream"), (header::CACHE_CONTROL, "no-cache")],
        Body::from_stream(frames),
    )
        .into_response())
}

pub async fn end_interview(
    State(state): State<AppState>,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let Json(request) = payload.map_err(json_rejection)?;
    require_id(&request.session_id, "sessionId")?;

    let transcript = state.orchestrator.end_interview(&SessionId(request.session_id)).await?;
    Ok(Json(TranscriptResponse { transcript }))
}

fn sse_frame(event: &StreamEvent) -> String {
    match serde_json::to_string(event) {
        Ok(json) => format!("data: {json}\n\n"),
        Err(_) => "data: {\"type\":\"error\",\"content\":\"failed to encode stream event\"}\n\n"
            .to_string(),
    }
}
