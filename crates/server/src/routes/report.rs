use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use debrief_core::domain::interview::SessionId;
use debrief_core::domain::report::{StructuredReport, UploadOptions, UploadResult};

use super::interview::SessionRequest;
use super::AppState;
use crate::errors::{json_rejection, require_id, ApiError};

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report: StructuredReport,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub deal_id: String,
    pub report: StructuredReport,
    pub options: UploadOptions,
}

pub async fn generate_report(
    State(state): State<AppState>,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> Result<Json<ReportResponse>, ApiError> {
    let Json(request) = payload.map_err(json_rejection)?;
    require_id(&request.session_id, "sessionId")?;

    let report = state.extractor.generate_report(&SessionId(request.session_id)).await?;
    Ok(Json(ReportResponse { report }))
}

pub async fn upload_report(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<UploadResult>, ApiError> {
    let Json(request) = payload.map_err(json_rejection)?;
    require_id(&request.deal_id, "dealId")?;

    let result =
        state.crm.upload_report(&request.deal_id, &request.report, &request.options).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};

    use debrief_agent::ScriptedReply;
    use debrief_core::domain::report::{DealUpdates, UploadOptions};

    use super::{generate_report, upload_report, UploadRequest};
    use crate::crm::format::tests::sample_report;
    use crate::routes::interview::{start_interview, SessionRequest, StartRequest};
    use crate::routes::test_support::test_app;

    #[tokio::test]
    async fn generate_returns_validated_report() {
        let report_json = serde_json::to_string(&sample_report()).expect("serialize");
        let app = test_app(vec![ScriptedReply::text(format!("```json\n{report_json}\n```"))]);
        let Json(started) = start_interview(
            State(app.state.clone()),
            Ok(Json(StartRequest { deal_id: "1001".to_string() })),
        )
        .await
        .expect("start");

        let Json(response) = generate_report(
            State(app.state),
            Ok(Json(SessionRequest { session_id: started.session_id })),
        )
        .await
        .expect("report");

        assert_eq!(response.report, sample_report());
    }

    #[tokio::test]
    async fn schema_violation_is_502() {
        let app = test_app(vec![ScriptedReply::text(r#"{"callType":"fax"}"#)]);
        let Json(started) = start_interview(
            State(app.state.clone()),
            Ok(Json(StartRequest { deal_id: "1001".to_string() })),
        )
        .await
        .expect("start");

        let error = generate_report(
            State(app.state),
            Ok(Json(SessionRequest { session_id: started.session_id })),
        )
        .await
        .expect_err("rejected");

        assert_eq!(error.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn upload_sends_requested_parts_only() {
        let app = test_app(Vec::new());

        let Json(result) = upload_report(
            State(app.state),
            Ok(Json(UploadRequest {
                deal_id: "1001".to_string(),
                report: sample_report(),
                options: UploadOptions {
                    create_note: false,
                    log_call: true,
                    update_deal: true,
                    deal_updates: Some(DealUpdates {
                        next_step: Some("Ship samples".to_string()),
                        ..DealUpdates::default()
                    }),
                },
            })),
        )
        .await
        .expect("upload");

        assert_eq!(result.note_id, None);
        assert!(result.call_id.is_some());
        assert!(result.deal_updated);
        assert_eq!(
            app.crm.uploads()[0].deal_properties,
            vec![("next_step", "Ship samples".to_string())]
        );
    }
}
