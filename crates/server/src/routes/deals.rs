use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;

use debrief_core::domain::deal::{DealDetail, DealSearchResult};

use super::AppState;
use crate::crm::DealQuery;
use crate::errors::{query_rejection, require_id, ApiError};

const DEFAULT_LIMIT: u32 = 20;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealsParams {
    pub q: Option<String>,
    pub owner_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn search_deals(
    State(state): State<AppState>,
    params: Result<Query<DealsParams>, QueryRejection>,
) -> Result<Json<DealSearchResult>, ApiError> {
    let Query(params) = params.map_err(query_rejection)?;
    let query = DealQuery {
        query: params.q.unwrap_or_default(),
        owner_id: params
            .owner_id
            .filter(|owner| !owner.is_empty())
            .or_else(|| Some(state.config.crm.default_owner_id.clone())),
        limit: params.limit.unwrap_or(DEFAULT_LIMIT),
        offset: params.offset.unwrap_or_default(),
    };

    Ok(Json(state.crm.search_deals(&query).await?))
}

pub async fn get_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
) -> Result<Json<DealDetail>, ApiError> {
    require_id(&deal_id, "deal id")?;
    Ok(Json(state.crm.get_deal(&deal_id).await?))
}
