use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::sync::Notify;

use debrief_cli::commands::interview::{drive, Outcome};
use debrief_cli::controller::{
    AssistantReply, CapabilityError, InterviewApi, InterviewController, SpeechCapture,
    SpeechSynthesizer, StartedSession,
};
use debrief_core::domain::deal::{DealContext, DealId};
use debrief_core::domain::interview::{InterviewMessage, MessageRole, SessionId};
use debrief_core::domain::report::{CallType, DealStageRecommendation, Sentiment, StructuredReport};
use debrief_core::flows::InterviewPhase;

fn report() -> StructuredReport {
    StructuredReport {
        call_date: "2026-03-04".to_string(),
        call_type: CallType::Phone,
        attendees: Vec::new(),
        summary: "Reviewed the cold brew program with dining services.".to_string(),
        topics_discussed: vec!["pricing".to_string()],
        key_insights: Vec::new(),
        action_items: Vec::new(),
        next_steps: Vec::new(),
        competitor_mentions: Vec::new(),
        deal_stage_recommendation: DealStageRecommendation {
            current_stage: "Engaging".to_string(),
            recommended_stage: "Engaging".to_string(),
            rationale: "No change discussed.".to_string(),
        },
        customer_sentiment: Sentiment::Positive,
        follow_up_date: None,
        pricing_notes: None,
        volume_notes: None,
    }
}

fn reply(response: &str, interview_complete: bool) -> Result<AssistantReply, CapabilityError> {
    Ok(AssistantReply { response: response.to_string(), interview_complete })
}

#[derive(Default)]
struct FakeApi {
    start_error: Option<CapabilityError>,
    replies: Mutex<VecDeque<Result<AssistantReply, CapabilityError>>>,
    reports: Mutex<VecDeque<Result<StructuredReport, CapabilityError>>>,
    turn_gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<String>>,
}

impl FakeApi {
    fn with_replies(replies: Vec<Result<AssistantReply, CapabilityError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            reports: Mutex::new(VecDeque::from([Ok(report())])),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls").push(call);
    }
}

#[async_trait]
impl InterviewApi for FakeApi {
    async fn start(&self, deal_id: &DealId) -> Result<StartedSession, CapabilityError> {
        self.record(format!("start {}", deal_id.0));
        if let Some(error) = &self.start_error {
            return Err(error.clone());
        }
        Ok(StartedSession {
            session_id: SessionId("sess-1".to_string()),
            greeting: "Hey! Tell me about your call with Campus Cafes. How did it go?".to_string(),
            deal_context: DealContext { deal_id: deal_id.0.clone(), ..DealContext::default() },
        })
    }

    async fn send_turn(
        &self,
        session_id: &SessionId,
        transcript: &str,
    ) -> Result<AssistantReply, CapabilityError> {
        self.record(format!("turn {} {transcript}", session_id.0));
        if let Some(gate) = &self.turn_gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .expect("replies")
            .pop_front()
            .unwrap_or_else(|| Err(CapabilityError::Network("no reply scripted".to_string())))
    }

    async fn end(&self, session_id: &SessionId) -> Result<Vec<InterviewMessage>, CapabilityError> {
        self.record(format!("end {}", session_id.0));
        Ok(Vec::new())
    }

    async fn generate_report(
        &self,
        session_id: &SessionId,
    ) -> Result<StructuredReport, CapabilityError> {
        self.record(format!("report {}", session_id.0));
        self.reports
            .lock()
            .expect("reports")
            .pop_front()
            .unwrap_or_else(|| Err(CapabilityError::Network("no report scripted".to_string())))
    }
}

#[derive(Default)]
struct FakeCapture {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

#[async_trait]
impl SpeechCapture for FakeCapture {
    async fn start(&self) -> Result<(), CapabilityError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CapabilityError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeVoice {
    spoken: Mutex<Vec<String>>,
    playback: Option<Arc<Notify>>,
    fail_next: Mutex<Option<CapabilityError>>,
    stops: AtomicUsize,
}

impl FakeVoice {
    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().expect("spoken").clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeVoice {
    async fn speak(&self, text: &str) -> Result<(), CapabilityError> {
        if let Some(error) = self.fail_next.lock().expect("fail_next").take() {
            return Err(error);
        }
        self.spoken.lock().expect("spoken").push(text.to_string());
        if let Some(playback) = &self.playback {
            playback.notified().await;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), CapabilityError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(playback) = &self.playback {
            playback.notify_one();
        }
        Ok(())
    }
}

struct Harness {
    controller: InterviewController,
    api: Arc<FakeApi>,
    capture: Arc<FakeCapture>,
    voice: Arc<FakeVoice>,
}

fn harness(api: FakeApi, voice: FakeVoice) -> Harness {
    let api = Arc::new(api);
    let capture = Arc::new(FakeCapture::default());
    let voice = Arc::new(voice);
    let controller = InterviewController::new(api.clone(), capture.clone(), voice.clone());
    Harness { controller, api, capture, voice }
}

fn deal() -> DealId {
    DealId("1001".to_string())
}

#[tokio::test]
async fn full_interview_reaches_complete_with_report() {
    let h = harness(
        FakeApi::with_replies(vec![
            reply("Who attended from their side?", false),
            reply("Great. I think I have everything I need.", true),
        ]),
        FakeVoice::default(),
    );

    h.controller.start(deal()).await.expect("start");
    assert_eq!(h.controller.phase(), InterviewPhase::Listening);
    assert_eq!(h.capture.starts.load(Ordering::SeqCst), 1);

    assert!(h.controller.finish_speaking("It went great, they want a quote").await.expect("turn"));
    assert_eq!(h.controller.phase(), InterviewPhase::Listening);

    assert!(h.controller.finish_speaking("Just Dana.").await.expect("turn"));

    let state = h.controller.state();
    assert_eq!(state.phase, InterviewPhase::Complete);
    assert_eq!(state.report, Some(report()));
    assert_eq!(state.messages.len(), 5);
    assert_eq!(state.messages[4].role, MessageRole::Assistant);
    assert_eq!(
        h.voice.spoken(),
        vec![
            "Hey! Tell me about your call with Campus Cafes. How did it go?".to_string(),
            "Who attended from their side?".to_string(),
        ]
    );
    assert_eq!(
        h.api.calls(),
        vec![
            "start 1001",
            "turn sess-1 It went great, they want a quote",
            "turn sess-1 Just Dana.",
            "report sess-1",
        ]
    );
}

#[tokio::test]
async fn blank_turn_keeps_listening_without_a_request() {
    let h = harness(FakeApi::with_replies(Vec::new()), FakeVoice::default());
    h.controller.start(deal()).await.expect("start");

    assert!(h.controller.finish_speaking("   ").await.expect("blank turn"));

    assert_eq!(h.controller.phase(), InterviewPhase::Listening);
    assert_eq!(h.capture.starts.load(Ordering::SeqCst), 2);
    assert_eq!(h.api.calls(), vec!["start 1001"]);
}

#[tokio::test]
async fn failed_turn_returns_to_listening_with_error() {
    let h = harness(
        FakeApi::with_replies(vec![Err(CapabilityError::Api {
            status: 502,
            message: "An upstream service failed. Please try again.".to_string(),
        })]),
        FakeVoice::default(),
    );
    h.controller.start(deal()).await.expect("start");

    h.controller.finish_speaking("Pricing came up.").await.expect("turn");

    let state = h.controller.state();
    assert_eq!(state.phase, InterviewPhase::Listening);
    assert_eq!(
        state.error.as_deref(),
        Some("server returned 502: An upstream service failed. Please try again.")
    );
    assert_eq!(h.capture.starts.load(Ordering::SeqCst), 2);

    h.controller.dismiss_error().await.expect("dismiss");
    assert_eq!(h.controller.state().error, None);
}

#[tokio::test]
async fn playback_failure_still_hands_the_turn_back() {
    let voice = FakeVoice::default();
    *voice.fail_next.lock().expect("fail_next") =
        Some(CapabilityError::Playback("no audio device".to_string()));
    let h = harness(FakeApi::with_replies(Vec::new()), voice);

    h.controller.start(deal()).await.expect("start");

    let state = h.controller.state();
    assert_eq!(state.phase, InterviewPhase::Listening);
    assert_eq!(state.error.as_deref(), Some("speech playback failed: no audio device"));
}

#[tokio::test]
async fn start_failure_returns_to_idle() {
    let api = FakeApi {
        start_error: Some(CapabilityError::Api { status: 404, message: "Deal not found".to_string() }),
        ..FakeApi::default()
    };
    let h = harness(api, FakeVoice::default());

    h.controller.start(deal()).await.expect("start dispatch");

    let state = h.controller.state();
    assert_eq!(state.phase, InterviewPhase::Idle);
    assert_eq!(state.error.as_deref(), Some("server returned 404: Deal not found"));
    assert!(h.voice.spoken().is_empty());
}

#[tokio::test]
async fn forced_end_stops_audio_and_summarizes() {
    let h = harness(FakeApi::with_replies(Vec::new()), FakeVoice::default());
    h.controller.start(deal()).await.expect("start");

    h.controller.end_interview().await.expect("end");

    assert_eq!(h.controller.phase(), InterviewPhase::Complete);
    assert_eq!(h.voice.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.capture.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.api.calls(), vec!["start 1001", "end sess-1", "report sess-1"]);
}

#[tokio::test]
async fn report_failure_waits_for_user_retry() {
    let api = FakeApi::with_replies(vec![reply("That's everything.", true)]);
    *api.reports.lock().expect("reports") = VecDeque::from([
        Err(CapabilityError::Api {
            status: 502,
            message: "An upstream service failed. Please try again.".to_string(),
        }),
        Ok(report()),
    ]);
    let h = harness(api, FakeVoice::default());
    h.controller.start(deal()).await.expect("start");

    h.controller.finish_speaking("Nothing else.").await.expect("turn");
    let failed = h.controller.state();
    assert_eq!(failed.phase, InterviewPhase::Summarizing);
    assert!(failed.error.is_some());

    h.controller.request_report().await.expect("retry");
    let state = h.controller.state();
    assert_eq!(state.phase, InterviewPhase::Complete);
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn reentrant_end_of_turn_is_ignored_while_processing() {
    let gate = Arc::new(Notify::new());
    let api = FakeApi {
        turn_gate: Some(gate.clone()),
        ..FakeApi::with_replies(vec![reply("Who attended?", false)])
    };
    let h = harness(api, FakeVoice::default());
    h.controller.start(deal()).await.expect("start");

    let (first, second) = tokio::join!(h.controller.finish_speaking("First answer"), async {
        assert!(h.controller.is_turn_in_flight());
        let second = h.controller.finish_speaking("Second answer").await;
        gate.notify_one();
        second
    });

    assert!(first.expect("first turn"));
    assert!(!second.expect("second turn"));
    assert!(!h.controller.is_turn_in_flight());
    assert_eq!(h.api.calls(), vec!["start 1001", "turn sess-1 First answer"]);
    assert_eq!(h.controller.state().messages.len(), 3);
}

#[tokio::test]
async fn playback_finishing_after_forced_end_is_dropped() {
    let playback = Arc::new(Notify::new());
    let voice = FakeVoice { playback: Some(playback), ..FakeVoice::default() };
    let h = harness(FakeApi::with_replies(Vec::new()), voice);

    let (started, ended) =
        tokio::join!(h.controller.start(deal()), h.controller.end_interview());

    started.expect("start");
    ended.expect("end");
    assert_eq!(h.controller.phase(), InterviewPhase::Complete);
    assert_eq!(h.capture.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn console_script_runs_interview_to_a_report() {
    let h = harness(
        FakeApi::with_replies(vec![reply("Who attended from their side?", false)]),
        FakeVoice::default(),
    );
    let input = BufReader::new("It went great\n\n/end\n".as_bytes());
    let mut out = Vec::new();

    let outcome = drive(&h.controller, deal(), input, &mut out).await.expect("drive");

    let Outcome::Reported(json) = outcome else {
        panic!("expected a report, got {outcome:?}");
    };
    let report: StructuredReport = serde_json::from_str(&json).expect("report json");
    assert_eq!(report.summary, "Reviewed the cold brew program with dining services.");
    assert_eq!(
        h.api.calls(),
        vec!["start 1001", "turn sess-1 It went great", "end sess-1", "report sess-1"]
    );
    assert!(String::from_utf8(out).expect("utf8").contains("you> "));
}

#[tokio::test]
async fn console_quit_and_eof_leave_without_report() {
    let h = harness(FakeApi::with_replies(Vec::new()), FakeVoice::default());
    let outcome = drive(&h.controller, deal(), BufReader::new("/quit\n".as_bytes()), Vec::new())
        .await
        .expect("drive");
    assert_eq!(outcome, Outcome::Quit);

    let h = harness(FakeApi::with_replies(Vec::new()), FakeVoice::default());
    let outcome =
        drive(&h.controller, deal(), BufReader::new("".as_bytes()), Vec::new()).await.expect("drive");
    assert_eq!(outcome, Outcome::Quit);
}
