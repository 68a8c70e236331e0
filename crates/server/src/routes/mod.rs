//! HTTP surface.
//!
//! - `GET  /api/deals`                   search deals
//! - `GET  /api/deals/{id}`              deal detail with contacts and company
//! - `POST /api/interview/start`         open a session and return the greeting
//! - `POST /api/interview/message`       one turn, whole reply
//! - `POST /api/interview/message/stream` one turn as `text/event-stream`
//! - `POST /api/interview/end`           force completion, return the transcript
//! - `POST /api/report/generate`         extract the structured report
//! - `POST /api/report/upload`           write the report to the CRM
//! - `GET  /health`                      liveness plus session store check

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use debrief_agent::{InterviewOrchestrator, ReportExtractor};
use debrief_core::config::AppConfig;

use crate::crm::CrmGateway;
use crate::health;

pub mod deals;
pub mod interview;
pub mod report;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<InterviewOrchestrator>,
    pub extractor: Arc<ReportExtractor>,
    pub crm: Arc<dyn CrmGateway>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/deals", get(deals::search_deals))
        .route("/api/deals/{id}", get(deals::get_deal))
        .route("/api/interview/start", post(interview::start_interview))
        .route("/api/interview/message", post(interview::send_message))
        .route("/api/interview/message/stream", post(interview::stream_message))
        .route("/api/interview/end", post(interview::end_interview))
        .route("/api/report/generate", post(report::generate_report))
        .route("/api/report/upload", post(report::upload_report))
        .route("/health", get(health::health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
