use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::deal::{DealContext, DealId};
use crate::domain::interview::{InterviewMessage, SessionId};
use crate::domain::report::StructuredReport;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewPhase {
    #[default]
    Idle,
    Greeting,
    Responding,
    Listening,
    Processing,
    Summarizing,
    Complete,
}

impl InterviewPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Greeting => "greeting",
            Self::Responding => "responding",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Summarizing => "summarizing",
            Self::Complete => "complete",
        }
    }
}

/// Client-side view of one interview. Only the flow produces new values of it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerState {
    pub phase: InterviewPhase,
    pub session_id: Option<SessionId>,
    pub deal_context: Option<DealContext>,
    pub messages: Vec<InterviewMessage>,
    pub report: Option<StructuredReport>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerEvent {
    StartRequested { deal_id: DealId },
    SessionStarted {
        session_id: SessionId,
        greeting: String,
        deal_context: DealContext,
        at: DateTime<Utc>,
    },
    PlaybackFinished,
    TurnEnded { transcript: String, at: DateTime<Utc> },
    ReplyReceived { response: String, interview_complete: bool, at: DateTime<Utc> },
    EndRequested,
    SessionEnded,
    ReportRequested,
    ReportReady { report: StructuredReport },
    Failed { message: String },
    ErrorDismissed,
}

impl ControllerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartRequested { .. } => "start_requested",
            Self::SessionStarted { .. } => "session_started",
            Self::PlaybackFinished => "playback_finished",
            Self::TurnEnded { .. } => "turn_ended",
            Self::ReplyReceived { .. } => "reply_received",
            Self::EndRequested => "end_requested",
            Self::SessionEnded => "session_ended",
            Self::ReportRequested => "report_requested",
            Self::ReportReady { .. } => "report_ready",
            Self::Failed { .. } => "failed",
            Self::ErrorDismissed => "error_dismissed",
        }
    }
}

/// Side effects the driver performs after a transition, in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerAction {
    CreateSession { deal_id: DealId },
    Speak { text: String },
    StartCapture,
    StopCapture,
    StopPlayback,
    SendTurn { session_id: SessionId, transcript: String },
    EndSession { session_id: SessionId },
    GenerateReport { session_id: SessionId },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: InterviewPhase,
    pub to: InterviewPhase,
    pub state: ControllerState,
    pub actions: Vec<ControllerAction>,
}
