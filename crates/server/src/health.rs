use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;

use crate::routes::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub backend: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub session_store: HealthCheck,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.orchestrator.store();
    let session_store = match store.health_check().await {
        Ok(()) => HealthCheck {
            status: "ok",
            backend: store.backend(),
            detail: "session store reachable".to_string(),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            backend: store.backend(),
            detail: format!("session store check failed: {error}"),
        },
    };
    let ready = session_store.status == "ok";

    let payload = HealthResponse {
        status: if ready { "ok" } else { "degraded" },
        timestamp: Utc::now().to_rfc3339(),
        session_store,
    };
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
