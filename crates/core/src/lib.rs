pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod prompts;
pub mod report;

pub use domain::deal::{DealContext, DealDetail, DealId, DealSearchResult, DealSummary};
pub use domain::interview::{InterviewMessage, InterviewSession, MessageRole, SessionId};
pub use domain::report::{StructuredReport, UploadOptions, UploadResult};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    ControllerAction, ControllerEvent, ControllerState, FlowDefinition, InterviewFlow,
    InterviewPhase,
};
pub use report::{parse_report, MalformedReport};
