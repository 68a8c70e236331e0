use thiserror::Error;

use crate::domain::interview::{InterviewMessage, SessionId};
use crate::flows::states::{
    ControllerAction, ControllerEvent, ControllerState, InterviewPhase, TransitionOutcome,
};

pub trait FlowDefinition {
    fn initial_state(&self) -> ControllerState;
    fn apply(
        &self,
        current: &ControllerState,
        event: &ControllerEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Transition table for a single spoken debrief, from deal selection to a
/// finished report.
#[derive(Clone, Copy, Debug, Default)]
pub struct InterviewFlow;

impl FlowDefinition for InterviewFlow {
    fn initial_state(&self) -> ControllerState {
        ControllerState::default()
    }

    fn apply(
        &self,
        current: &ControllerState,
        event: &ControllerEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_interview(current, event)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("no active session while in {phase:?}")]
    MissingSession { phase: InterviewPhase },
    #[error("invalid transition from {phase:?} using event {event}")]
    InvalidTransition { phase: InterviewPhase, event: &'static str },
}

fn transition_interview(
    current: &ControllerState,
    event: &ControllerEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ControllerAction::{
        CreateSession, EndSession, GenerateReport, SendTurn, Speak, StartCapture, StopCapture,
        StopPlayback,
    };
    use InterviewPhase::{
        Complete, Greeting, Idle, Listening, Processing, Responding, Summarizing,
    };

    let mut next = current.clone();
    let actions = match (current.phase, event) {
        (Idle | Complete, ControllerEvent::StartRequested { deal_id }) => {
            next = ControllerState { phase: Greeting, ..ControllerState::default() };
            vec![CreateSession { deal_id: deal_id.clone() }]
        }
        (Greeting, ControllerEvent::SessionStarted { session_id, greeting, deal_context, at }) => {
            next.phase = Responding;
            next.session_id = Some(session_id.clone());
            next.deal_context = Some(deal_context.clone());
            next.messages = vec![InterviewMessage::assistant(greeting.clone(), *at)];
            vec![Speak { text: greeting.clone() }]
        }
        (Responding, ControllerEvent::PlaybackFinished) => {
            next.phase = Listening;
            vec![StartCapture]
        }
        (Listening, ControllerEvent::TurnEnded { transcript, at }) => {
            let transcript = transcript.trim();
            if transcript.is_empty() {
                vec![StartCapture]
            } else {
                let session_id = active_session(current)?;
                next.phase = Processing;
                next.messages.push(InterviewMessage::user(transcript, *at));
                vec![SendTurn { session_id, transcript: transcript.to_string() }]
            }
        }
        (Processing, ControllerEvent::ReplyReceived { response, interview_complete, at }) => {
            next.messages.push(InterviewMessage::assistant(response.clone(), *at));
            if *interview_complete {
                next.phase = Summarizing;
                vec![GenerateReport { session_id: active_session(current)? }]
            } else {
                next.phase = Responding;
                vec![Speak { text: response.clone() }]
            }
        }
        (Listening | Responding, ControllerEvent::EndRequested) => {
            let session_id = active_session(current)?;
            next.phase = Summarizing;
            vec![StopPlayback, StopCapture, EndSession { session_id }]
        }
        (Summarizing, ControllerEvent::SessionEnded) => {
            vec![GenerateReport { session_id: active_session(current)? }]
        }
        (Summarizing, ControllerEvent::ReportRequested) => {
            next.error = None;
            vec![GenerateReport { session_id: active_session(current)? }]
        }
        (Summarizing, ControllerEvent::ReportReady { report }) => {
            next.phase = Complete;
            next.report = Some(report.clone());
            Vec::new()
        }
        (Greeting, ControllerEvent::Failed { message }) => {
            next.phase = Idle;
            next.error = Some(message.clone());
            Vec::new()
        }
        (Responding | Listening | Processing, ControllerEvent::Failed { message }) => {
            next.phase = Listening;
            next.error = Some(message.clone());
            vec![StartCapture]
        }
        (Summarizing, ControllerEvent::Failed { message }) => {
            next.error = Some(message.clone());
            Vec::new()
        }
        (_, ControllerEvent::ErrorDismissed) => {
            next.error = None;
            Vec::new()
        }
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                phase: current.phase,
                event: event.name(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.phase, to: next.phase, state: next, actions })
}

fn active_session(state: &ControllerState) -> Result<SessionId, FlowTransitionError> {
    state.session_id.clone().ok_or(FlowTransitionError::MissingSession { phase: state.phase })
}
