use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use debrief_core::domain::interview::{InterviewMessage, SessionId};
use debrief_core::domain::report::StructuredReport;
use debrief_core::prompts::{report_extraction_prompt, report_request};
use debrief_core::report::parse_report;
use debrief_db::SessionStore;

use crate::errors::InterviewError;
use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
use crate::runtime::TurnSettings;

/// Turns a finished transcript into a [`StructuredReport`].
pub struct ReportExtractor {
    store: Arc<dyn SessionStore>,
    llm: Arc<dyn LlmClient>,
    settings: TurnSettings,
}

impl ReportExtractor {
    pub fn new(
        store: Arc<dyn SessionStore>,
        llm: Arc<dyn LlmClient>,
        settings: TurnSettings,
    ) -> Self {
        Self { store, llm, settings }
    }

    pub async fn generate_report(&self, id: &SessionId) -> Result<StructuredReport, InterviewError> {
        let session =
            self.store.get(id).await?.ok_or_else(|| InterviewError::NotFound(id.clone()))?;

        let request = CompletionRequest::new(
            report_extraction_prompt(session.deal_context(), Utc::now().date_naive()),
            vec![ChatMessage::from(&InterviewMessage::user(
                report_request(session.messages()),
                Utc::now(),
            ))],
            self.settings.report_max_tokens,
        );

        let raw = self
            .settings
            .timed(self.llm.complete(request))
            .await?
            .ok_or(InterviewError::Extraction)?;

        let report = parse_report(&raw).map_err(|error| {
            warn!(event_name = "report.rejected", session_id = %id, error = %error);
            error
        })?;

        info!(
            event_name = "report.generated",
            session_id = %id,
            action_items = report.action_items.len(),
            sentiment = report.customer_sentiment.as_str(),
        );
        Ok(report)
    }
}
