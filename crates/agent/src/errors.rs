use thiserror::Error;

use debrief_core::domain::interview::SessionId;
use debrief_core::errors::ApplicationError;
use debrief_core::report::MalformedReport;
use debrief_db::StoreError;

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum InterviewError {
    #[error("Session not found")]
    NotFound(SessionId),
    #[error("another turn is already in progress for session {0}")]
    Conflict(SessionId),
    #[error("no text content in model response")]
    Extraction,
    #[error(transparent)]
    MalformedReport(#[from] MalformedReport),
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error("session store failure: {0}")]
    Store(#[from] StoreError),
}

impl From<InterviewError> for ApplicationError {
    fn from(error: InterviewError) -> Self {
        match error {
            InterviewError::NotFound(id) => ApplicationError::not_found("Session", id.0),
            InterviewError::Conflict(id) => ApplicationError::Conflict(format!(
                "another turn is already in progress for session {id}"
            )),
            InterviewError::Extraction => {
                ApplicationError::Extraction("no text content in model response".to_string())
            }
            InterviewError::MalformedReport(error) => ApplicationError::MalformedReport(error),
            InterviewError::Model(error) => ApplicationError::Model(error.to_string()),
            InterviewError::Store(error) => ApplicationError::Persistence(error.to_string()),
        }
    }
}
