//! Interview runtime: the model capability, the per-turn orchestrator and the
//! report extractor.
//!
//! The model is treated as an untrusted text source. Its replies are appended to
//! the session log verbatim, and report output only reaches callers after the
//! schema gate in `debrief_core::report` has accepted it.

pub mod anthropic;
pub mod errors;
pub mod extractor;
pub mod llm;
pub mod locks;
pub mod runtime;
pub mod scripted;

pub use anthropic::AnthropicClient;
pub use errors::InterviewError;
pub use extractor::ReportExtractor;
pub use llm::{ChatMessage, CompletionRequest, LlmClient, LlmError};
pub use runtime::{InterviewOrchestrator, StreamEvent, TurnReply, TurnSettings};
pub use scripted::{ScriptedLlmClient, ScriptedReply};
