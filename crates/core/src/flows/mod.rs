pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowTransitionError, InterviewFlow};
pub use states::{
    ControllerAction, ControllerEvent, ControllerState, InterviewPhase, TransitionOutcome,
};
