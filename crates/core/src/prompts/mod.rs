//! Prompt rendering for the interviewer and the report extractor.
//!
//! Everything here is a pure function of the deal context (and the transcript or
//! date where noted), so the same inputs always yield byte-identical prompts.

pub mod interviewer;
pub mod report_generator;

pub use interviewer::{
    greeting, interviewer_prompt, is_completion_signal, PipelineKind, COMPLETION_PHRASE,
};
pub use report_generator::{render_transcript, report_extraction_prompt, report_request};
