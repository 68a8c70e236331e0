//! Drives [`InterviewFlow`] against real capabilities.
//!
//! The flow decides; the controller performs. Every action result comes back
//! in as an event, so the state only ever changes through a flow transition.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use debrief_core::domain::deal::{DealContext, DealId};
use debrief_core::domain::interview::{InterviewMessage, SessionId};
use debrief_core::domain::report::StructuredReport;
use debrief_core::errors::DomainError;
use debrief_core::flows::{
    ControllerAction, ControllerEvent, ControllerState, FlowDefinition, InterviewFlow,
    InterviewPhase,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("stream failed: {0}")]
    Stream(String),
    #[error("audio capture failed: {0}")]
    Capture(String),
    #[error("speech playback failed: {0}")]
    Playback(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    pub session_id: SessionId,
    pub greeting: String,
    pub deal_context: DealContext,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantReply {
    pub response: String,
    pub interview_complete: bool,
}

/// The interview service as seen from the device.
#[async_trait]
pub trait InterviewApi: Send + Sync {
    async fn start(&self, deal_id: &DealId) -> Result<StartedSession, CapabilityError>;
    async fn send_turn(
        &self,
        session_id: &SessionId,
        transcript: &str,
    ) -> Result<AssistantReply, CapabilityError>;
    async fn end(&self, session_id: &SessionId) -> Result<Vec<InterviewMessage>, CapabilityError>;
    async fn generate_report(
        &self,
        session_id: &SessionId,
    ) -> Result<StructuredReport, CapabilityError>;
}

/// Microphone side. Finished utterances arrive through
/// [`InterviewController::finish_speaking`], not through this trait.
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    async fn start(&self) -> Result<(), CapabilityError>;
    async fn stop(&self) -> Result<(), CapabilityError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Resolves once playback has finished or was stopped.
    async fn speak(&self, text: &str) -> Result<(), CapabilityError>;
    async fn stop(&self) -> Result<(), CapabilityError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub struct InterviewController {
    flow: InterviewFlow,
    state: Mutex<ControllerState>,
    api: Arc<dyn InterviewApi>,
    capture: Arc<dyn SpeechCapture>,
    voice: Arc<dyn SpeechSynthesizer>,
    turn_in_flight: AtomicBool,
}

impl InterviewController {
    pub fn new(
        api: Arc<dyn InterviewApi>,
        capture: Arc<dyn SpeechCapture>,
        voice: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let flow = InterviewFlow;
        Self {
            state: Mutex::new(flow.initial_state()),
            flow,
            api,
            capture,
            voice,
            turn_in_flight: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.lock_state().clone()
    }

    pub fn phase(&self) -> InterviewPhase {
        self.lock_state().phase
    }

    pub async fn start(&self, deal_id: DealId) -> Result<(), ControllerError> {
        self.dispatch(ControllerEvent::StartRequested { deal_id }).await
    }

    /// The rep finished an utterance. Ignored while another turn is still
    /// being processed; returns whether the call was accepted.
    pub async fn finish_speaking(&self, transcript: &str) -> Result<bool, ControllerError> {
        if self
            .turn_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(event_name = "controller.turn_ignored", "turn already in flight");
            return Ok(false);
        }

        let result = self
            .dispatch(ControllerEvent::TurnEnded { transcript: transcript.to_string(), at: Utc::now() })
            .await;
        self.turn_in_flight.store(false, Ordering::Release);
        result.map(|()| true)
    }

    pub async fn end_interview(&self) -> Result<(), ControllerError> {
        self.dispatch(ControllerEvent::EndRequested).await
    }

    pub async fn request_report(&self) -> Result<(), ControllerError> {
        self.dispatch(ControllerEvent::ReportRequested).await
    }

    pub async fn dismiss_error(&self) -> Result<(), ControllerError> {
        self.dispatch(ControllerEvent::ErrorDismissed).await
    }

    pub fn is_turn_in_flight(&self) -> bool {
        self.turn_in_flight.load(Ordering::Acquire)
    }

    async fn dispatch(&self, event: ControllerEvent) -> Result<(), ControllerError> {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let actions = {
                let mut state = self.lock_state();
                if is_stale(state.phase, &event) {
                    debug!(
                        event_name = "controller.stale_event_dropped",
                        phase = state.phase.as_str(),
                        event = event.name()
                    );
                    continue;
                }

                let outcome = self.flow.apply(&state, &event).map_err(DomainError::from)?;
                info!(
                    event_name = "controller.transition",
                    from = outcome.from.as_str(),
                    to = outcome.to.as_str(),
                    event = event.name()
                );
                *state = outcome.state;
                outcome.actions
            };

            let recovering = matches!(event, ControllerEvent::Failed { .. });
            for action in actions {
                let Some(follow_up) = self.perform(action).await else {
                    continue;
                };
                if recovering && matches!(follow_up, ControllerEvent::Failed { .. }) {
                    // A failing recovery action must not feed another failure back in.
                    warn!(event_name = "controller.recovery_failed", "recovery action failed");
                    continue;
                }
                pending.push_back(follow_up);
            }
        }

        Ok(())
    }

    async fn perform(&self, action: ControllerAction) -> Option<ControllerEvent> {
        let result = match action {
            ControllerAction::CreateSession { deal_id } => {
                self.api.start(&deal_id).await.map(|started| {
                    Some(ControllerEvent::SessionStarted {
                        session_id: started.session_id,
                        greeting: started.greeting,
                        deal_context: started.deal_context,
                        at: Utc::now(),
                    })
                })
            }
            ControllerAction::Speak { text } => {
                self.voice.speak(&text).await.map(|()| Some(ControllerEvent::PlaybackFinished))
            }
            ControllerAction::StartCapture => self.capture.start().await.map(|()| None),
            ControllerAction::StopCapture => self.capture.stop().await.map(|()| None),
            ControllerAction::StopPlayback => self.voice.stop().await.map(|()| None),
            ControllerAction::SendTurn { session_id, transcript } => {
                self.api.send_turn(&session_id, &transcript).await.map(|reply| {
                    Some(ControllerEvent::ReplyReceived {
                        response: reply.response,
                        interview_complete: reply.interview_complete,
                        at: Utc::now(),
                    })
                })
            }
            ControllerAction::EndSession { session_id } => {
                self.api.end(&session_id).await.map(|_| Some(ControllerEvent::SessionEnded))
            }
            ControllerAction::GenerateReport { session_id } => self
                .api
                .generate_report(&session_id)
                .await
                .map(|report| Some(ControllerEvent::ReportReady { report })),
        };

        result.unwrap_or_else(|error| {
            warn!(event_name = "controller.capability_failed", error = %error);
            Some(ControllerEvent::Failed { message: error.to_string() })
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Late playback, turn and reply results after the rep forced the end.
fn is_stale(phase: InterviewPhase, event: &ControllerEvent) -> bool {
    match phase {
        InterviewPhase::Summarizing => matches!(
            event,
            ControllerEvent::PlaybackFinished
                | ControllerEvent::TurnEnded { .. }
                | ControllerEvent::ReplyReceived { .. }
        ),
        InterviewPhase::Complete => matches!(
            event,
            ControllerEvent::PlaybackFinished
                | ControllerEvent::TurnEnded { .. }
                | ControllerEvent::ReplyReceived { .. }
                | ControllerEvent::SessionEnded
                | ControllerEvent::Failed { .. }
        ),
        _ => false,
    }
}
