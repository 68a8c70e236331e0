use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use debrief_core::config::LlmConfig;
use debrief_core::domain::deal::{DealContext, DealId};
use debrief_core::domain::interview::{InterviewMessage, InterviewSession, SessionId};
use debrief_core::prompts::{greeting, interviewer_prompt, is_completion_signal};
use debrief_db::SessionStore;

use crate::errors::InterviewError;
use crate::llm::{ChatMessage, CompletionRequest, LlmClient, LlmError};
use crate::locks::SessionLocks;

/// Assistant text used when the model answers without a text block.
pub const FALLBACK_REPLY: &str = "Could you repeat that?";

const DELTA_BUFFER: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnSettings {
    pub max_tokens: u32,
    pub report_max_tokens: u32,
    pub timeout: Duration,
}

impl TurnSettings {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            report_max_tokens: config.report_max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Bounds a model call by `timeout`.
    pub(crate) async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, LlmError>>,
    ) -> Result<T, LlmError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.timeout)),
        }
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self { max_tokens: 1024, report_max_tokens: 4096, timeout: Duration::from_secs(60) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    pub response: String,
    pub interview_complete: bool,
}

/// Frames of a streamed turn. A stream carries any number of `Token`s followed
/// by exactly one `Done` or `Error`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token {
        content: String,
    },
    Done {
        content: String,
        #[serde(rename = "interviewComplete")]
        interview_complete: bool,
    },
    Error {
        content: String,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token { .. })
    }
}

/// Drives interview sessions: persists every turn and talks to the model.
///
/// Turns on one session are serialized by a per-session lock. A turn that
/// finds the lock taken fails with [`InterviewError::Conflict`] instead of
/// queueing, while `end_interview` waits for the running turn to finish.
pub struct InterviewOrchestrator {
    store: Arc<dyn SessionStore>,
    llm: Arc<dyn LlmClient>,
    locks: SessionLocks,
    settings: TurnSettings,
}

impl InterviewOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        llm: Arc<dyn LlmClient>,
        settings: TurnSettings,
    ) -> Self {
        Self { store, llm, locks: SessionLocks::new(), settings }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub async fn start_session(
        &self,
        deal_id: DealId,
        deal_context: DealContext,
    ) -> Result<InterviewSession, InterviewError> {
        let session = InterviewSession::new(SessionId::generate(), deal_id, deal_context, Utc::now());
        self.store.set(session.id(), &session).await?;

        info!(
            event_name = "interview.session_started",
            session_id = %session.id(),
            deal_id = session.deal_id().0.as_str(),
            store = self.store.backend(),
        );
        Ok(session)
    }

    /// Appends the opening line to the session and persists it.
    pub async fn greeting(&self, session: &mut InterviewSession) -> Result<String, InterviewError> {
        let text = greeting(session.deal_context());
        session.append(InterviewMessage::assistant(text.clone(), Utc::now()));
        self.store.set(session.id(), session).await?;
        Ok(text)
    }

    pub async fn send_message(
        &self,
        id: &SessionId,
        text: &str,
    ) -> Result<TurnReply, InterviewError> {
        let _guard = self.locks.try_acquire(id).ok_or_else(|| InterviewError::Conflict(id.clone()))?;
        let mut session = self.load(id).await?;
        session.append(InterviewMessage::user(text, Utc::now()));

        let request = self.turn_request(&session);
        match self.settings.timed(self.llm.complete(request)).await {
            Ok(reply) => {
                let reply = reply.unwrap_or_else(|| FALLBACK_REPLY.to_string());
                self.finish_turn(session, reply).await
            }
            Err(error) => self.abandon_turn(&session, error).await,
        }
    }

    /// Streams one turn into `sink`. The terminal event is always attempted,
    /// including for lookups and lock conflicts that fail before the model is
    /// called. A sink that closes mid-stream cancels the model call.
    pub async fn stream_message(
        &self,
        id: &SessionId,
        text: &str,
        sink: mpsc::Sender<StreamEvent>,
    ) -> Result<TurnReply, InterviewError> {
        let result = self.stream_turn(id, text, &sink).await;
        let terminal = match &result {
            Ok(reply) => StreamEvent::Done {
                content: reply.response.clone(),
                interview_complete: reply.interview_complete,
            },
            Err(error) => StreamEvent::Error { content: error.to_string() },
        };
        // The client may already be gone.
        let _ = sink.send(terminal).await;
        result
    }

    pub async fn end_interview(
        &self,
        id: &SessionId,
    ) -> Result<Vec<InterviewMessage>, InterviewError> {
        let _guard = self.locks.acquire(id).await;
        let mut session = self.load(id).await?;
        session.mark_completed();
        self.store.set(id, &session).await?;

        info!(
            event_name = "interview.ended",
            session_id = %id,
            messages = session.messages().len(),
        );
        Ok(session.messages().to_vec())
    }

    pub async fn transcript(&self, id: &SessionId) -> Result<Vec<InterviewMessage>, InterviewError> {
        Ok(self.load(id).await?.messages().to_vec())
    }

    async fn stream_turn(
        &self,
        id: &SessionId,
        text: &str,
        sink: &mpsc::Sender<StreamEvent>,
    ) -> Result<TurnReply, InterviewError> {
        let _guard = self.locks.try_acquire(id).ok_or_else(|| InterviewError::Conflict(id.clone()))?;
        let mut session = self.load(id).await?;
        session.append(InterviewMessage::user(text, Utc::now()));

        let request = self.turn_request(&session);
        let (delta_tx, mut delta_rx) = mpsc::channel::<String>(DELTA_BUFFER);
        let forward = async move {
            while let Some(content) = delta_rx.recv().await {
                if sink.send(StreamEvent::Token { content }).await.is_err() {
                    break;
                }
            }
        };

        let (outcome, ()) =
            tokio::join!(self.settings.timed(self.llm.stream(request, delta_tx)), forward);

        match outcome {
            // A reply the rep never received does not enter the history.
            Ok(_) if sink.is_closed() => self.abandon_turn(&session, LlmError::Cancelled).await,
            Ok(full_text) => self.finish_turn(session, full_text).await,
            Err(error) => self.abandon_turn(&session, error).await,
        }
    }

    async fn finish_turn(
        &self,
        mut session: InterviewSession,
        reply: String,
    ) -> Result<TurnReply, InterviewError> {
        let interview_complete = is_completion_signal(&reply);
        session.append(InterviewMessage::assistant(reply.clone(), Utc::now()));
        if interview_complete {
            session.mark_completed();
        }
        self.store.set(session.id(), &session).await?;

        info!(
            event_name = "interview.turn_completed",
            session_id = %session.id(),
            messages = session.messages().len(),
            interview_complete,
        );
        Ok(TurnReply { response: reply, interview_complete })
    }

    /// Keeps the rep's words when the model fails; partial replies are dropped.
    async fn abandon_turn(
        &self,
        session: &InterviewSession,
        error: LlmError,
    ) -> Result<TurnReply, InterviewError> {
        warn!(
            event_name = "interview.turn_failed",
            session_id = %session.id(),
            error = %error,
        );
        self.store.set(session.id(), session).await?;
        Err(error.into())
    }

    async fn load(&self, id: &SessionId) -> Result<InterviewSession, InterviewError> {
        self.store.get(id).await?.ok_or_else(|| InterviewError::NotFound(id.clone()))
    }

    fn turn_request(&self, session: &InterviewSession) -> CompletionRequest {
        CompletionRequest::new(
            interviewer_prompt(session.deal_context()),
            session.messages().iter().map(ChatMessage::from).collect(),
            self.settings.max_tokens,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use tokio::sync::mpsc;

    use debrief_core::domain::deal::{DealContext, DealId};
    use debrief_core::domain::interview::{MessageRole, SessionId};
    use debrief_core::prompts::COMPLETION_PHRASE;
    use debrief_db::{InMemorySessionStore, SessionStore};

    use super::{InterviewOrchestrator, StreamEvent, TurnSettings, FALLBACK_REPLY};
    use crate::errors::InterviewError;
    use crate::llm::LlmError;
    use crate::scripted::{ScriptedLlmClient, ScriptedReply};

    fn orchestrator(llm: Arc<ScriptedLlmClient>) -> (InterviewOrchestrator, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new(Duration::minutes(30)));
        let orchestrator = InterviewOrchestrator::new(store.clone(), llm, TurnSettings::default());
        (orchestrator, store)
    }

    fn context() -> DealContext {
        DealContext {
            deal_name: "Blue Bottle Cold Brew".to_string(),
            customer_name: "Blue Bottle".to_string(),
            ..DealContext::default()
        }
    }

    #[tokio::test]
    async fn start_and_greet_persists_first_assistant_message() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let (orchestrator, store) = orchestrator(llm.clone());

        let mut session =
            orchestrator.start_session(DealId("d-1".to_string()), context()).await.expect("start");
        let greeting = orchestrator.greeting(&mut session).await.expect("greeting");

        assert_eq!(greeting, "Hey! Tell me about your call with Blue Bottle. How did it go?");
        let stored = store.get(session.id()).await.expect("get").expect("present");
        assert_eq!(stored.messages().len(), 1);
        assert_eq!(stored.messages()[0].role, MessageRole::Assistant);
        assert!(!stored.is_completed());
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn send_message_appends_both_turns_and_sends_full_history() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([ScriptedReply::text(
            "Who was in the meeting?",
        )]));
        let (orchestrator, store) = orchestrator(llm.clone());
        let mut session =
            orchestrator.start_session(DealId("d-1".to_string()), context()).await.expect("start");
        orchestrator.greeting(&mut session).await.expect("greeting");

        let reply = orchestrator.send_message(session.id(), "It went well.").await.expect("turn");

        assert_eq!(reply.response, "Who was in the meeting?");
        assert!(!reply.interview_complete);
        let stored = store.get(session.id()).await.expect("get").expect("present");
        assert_eq!(stored.messages().len(), 3);

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, 1024);
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].messages[1].content, "It went well.");
        assert!(requests[0].system.contains("Blue Bottle Cold Brew"));
    }

    #[tokio::test]
    async fn completion_phrase_marks_session_completed() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([ScriptedReply::text(format!(
            "Thanks. {COMPLETION_PHRASE}"
        ))]));
        let (orchestrator, store) = orchestrator(llm);
        let session =
            orchestrator.start_session(DealId("d-1".to_string()), context()).await.expect("start");

        let reply = orchestrator.send_message(session.id(), "That's all.").await.expect("turn");

        assert!(reply.interview_complete);
        assert!(store.get(session.id()).await.expect("get").expect("present").is_completed());
    }

    #[tokio::test]
    async fn later_turns_do_not_clear_completion() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([
            ScriptedReply::text(format!("Thanks. {COMPLETION_PHRASE}")),
            ScriptedReply::text("Anything else about pricing?"),
        ]));
        let (orchestrator, store) = orchestrator(llm);
        let session =
            orchestrator.start_session(DealId("d-1".to_string()), context()).await.expect("start");
        orchestrator.send_message(session.id(), "That's all.").await.expect("closing turn");

        let reply = orchestrator.send_message(session.id(), "Oh, one more thing.").await.expect("turn");

        assert!(!reply.interview_complete);
        let stored = store.get(session.id()).await.expect("get").expect("present");
        assert!(stored.is_completed());
        assert_eq!(stored.messages().len(), 4);
    }

    #[tokio::test]
    async fn forced_end_stays_completed_across_further_turns() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([ScriptedReply::text(
            "Who else was on the call?",
        )]));
        let (orchestrator, store) = orchestrator(llm);
        let session =
            orchestrator.start_session(DealId("d-1".to_string()), context()).await.expect("start");
        orchestrator.end_interview(session.id()).await.expect("end");

        let reply = orchestrator.send_message(session.id(), "Wait, I forgot.").await.expect("turn");

        assert!(!reply.interview_complete);
        assert!(store.get(session.id()).await.expect("get").expect("present").is_completed());
    }

    #[tokio::test]
    async fn missing_text_block_falls_back() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([ScriptedReply::NoText]));
        let (orchestrator, _) = orchestrator(llm);
        let session =
            orchestrator.start_session(DealId("d-1".to_string()), context()).await.expect("start");

        let reply = orchestrator.send_message(session.id(), "Hello?").await.expect("turn");

        assert_eq!(reply.response, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn model_failure_keeps_user_turn_only() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([ScriptedReply::Error(LlmError::Api {
            status: 529,
            message: "Overloaded".to_string(),
        })]));
        let (orchestrator, store) = orchestrator(llm);
        let session =
            orchestrator.start_session(DealId("d-1".to_string()), context()).await.expect("start");

        let error = orchestrator.send_message(session.id(), "Hi").await.expect_err("model fails");

        assert!(matches!(error, InterviewError::Model(LlmError::Api { status: 529, .. })));
        let stored = store.get(session.id()).await.expect("get").expect("present");
        assert_eq!(stored.messages().len(), 1);
        assert_eq!(stored.messages()[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found_everywhere() {
        let (orchestrator, _) = orchestrator(Arc::new(ScriptedLlmClient::new()));
        let missing = SessionId("missing".to_string());

        assert!(matches!(
            orchestrator.send_message(&missing, "hi").await,
            Err(InterviewError::NotFound(_))
        ));
        assert!(matches!(orchestrator.end_interview(&missing).await, Err(InterviewError::NotFound(_))));
        assert!(matches!(orchestrator.transcript(&missing).await, Err(InterviewError::NotFound(_))));

        let (sink, mut events) = mpsc::channel(8);
        let result = orchestrator.stream_message(&missing, "hi", sink).await;
        assert!(matches!(result, Err(InterviewError::NotFound(_))));
        assert_eq!(
            events.recv().await,
            Some(StreamEvent::Error { content: "Session not found".to_string() })
        );
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn stream_emits_tokens_then_done() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([ScriptedReply::chunks([
            "Who ", "was ", "there?",
        ])]));
        let (orchestrator, store) = orchestrator(llm);
        let session =
            orchestrator.start_session(DealId("d-1".to_string()), context()).await.expect("start");
        let (sink, mut events) = mpsc::channel(8);

        let reply = orchestrator.stream_message(session.id(), "Great call.", sink).await.expect("turn");

        let mut received = Vec::new();
        while let Some(event) = events.recv().await {
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                StreamEvent::Token { content: "Who ".to_string() },
                StreamEvent::Token { content: "was ".to_string() },
                StreamEvent::Token { content: "there?".to_string() },
                StreamEvent::Done { content: "Who was there?".to_string(), interview_complete: false },
            ]
        );
        assert_eq!(reply.response, "Who was there?");
        let stored = store.get(session.id()).await.expect("get").expect("present");
        assert_eq!(stored.messages().len(), 2);
        assert_eq!(stored.messages()[1].content, "Who was there?");
    }

    #[tokio::test]
    async fn stream_failure_discards_partial_reply() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([ScriptedReply::ChunksThenError(
            vec!["Who ".to_string()],
            LlmError::Stream("Overloaded".to_string()),
        )]));
        let (orchestrator, store) = orchestrator(llm);
        let session =
            orchestrator.start_session(DealId("d-1".to_string()), context()).await.expect("start");
        let (sink, mut events) = mpsc::channel(8);

        let result = orchestrator.stream_message(session.id(), "Hello", sink).await;

        assert!(result.is_err());
        assert_eq!(events.recv().await, Some(StreamEvent::Token { content: "Who ".to_string() }));
        let terminal = events.recv().await.expect("terminal event");
        assert!(matches!(terminal, StreamEvent::Error { .. }));
        assert_eq!(events.recv().await, None);

        let stored = store.get(session.id()).await.expect("get").expect("present");
        assert_eq!(stored.messages().len(), 1);
        assert_eq!(stored.messages()[0].content, "Hello");
    }

    #[tokio::test]
    async fn closed_sink_cancels_the_model_call() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([ScriptedReply::chunks([
            "one", "two", "three",
        ])]));
        let (orchestrator, store) = orchestrator(llm);
        let session =
            orchestrator.start_session(DealId("d-1".to_string()), context()).await.expect("start");
        let (sink, events) = mpsc::channel(1);
        drop(events);

        let result = orchestrator.stream_message(session.id(), "Hello", sink).await;

        assert!(matches!(result, Err(InterviewError::Model(LlmError::Cancelled))));
        let stored = store.get(session.id()).await.expect("get").expect("present");
        assert_eq!(stored.messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_model_times_out() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([ScriptedReply::Hang]));
        let (orchestrator, store) = orchestrator(llm);
        let session =
            orchestrator.start_session(DealId("d-1".to_string()), context()).await.expect("start");

        let error = orchestrator.send_message(session.id(), "Hello").await.expect_err("timeout");

        assert!(matches!(error, InterviewError::Model(LlmError::Timeout(_))));
        assert_eq!(store.get(session.id()).await.expect("get").expect("present").messages().len(), 1);
    }

    #[tokio::test]
    async fn end_interview_persists_completion_and_returns_transcript() {
        let (orchestrator, store) = orchestrator(Arc::new(ScriptedLlmClient::new()));
        let mut session =
            orchestrator.start_session(DealId("d-1".to_string()), context()).await.expect("start");
        orchestrator.greeting(&mut session).await.expect("greeting");

        let transcript = orchestrator.end_interview(session.id()).await.expect("end");

        assert_eq!(transcript.len(), 1);
        assert!(store.get(session.id()).await.expect("get").expect("present").is_completed());
        assert_eq!(orchestrator.transcript(session.id()).await.expect("transcript"), transcript);
    }

    #[test]
    fn stream_events_use_wire_shape() {
        let done = serde_json::to_value(StreamEvent::Done {
            content: "ok".to_string(),
            interview_complete: true,
        })
        .expect("serialize");
        assert_eq!(done["type"], "done");
        assert_eq!(done["interviewComplete"], true);

        let token =
            serde_json::to_value(StreamEvent::Token { content: "a".to_string() }).expect("serialize");
        assert_eq!(token, serde_json::json!({"type": "token", "content": "a"}));
        assert!(!StreamEvent::Token { content: String::new() }.is_terminal());
    }
}
