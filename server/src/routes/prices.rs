// server/src/routes/prices.rs
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use shared_models::Quote;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct ForceQuery {
    #[serde(default)]
    pub force_refresh: bool,
}

pub async fn single(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<ForceQuery>,
) -> ApiResult<Json<Quote>> {
    Ok(Json(state.cache.get(&code, query.force_refresh).await))
}

#[derive(Deserialize)]
pub struct BatchRequest {
    pub codes: Vec<String>,
}

pub async fn batch(
    State(state): State<AppState>,
    Query(query): Query<ForceQuery>,
    Json(body): Json<BatchRequest>,
) -> ApiResult<Json<Vec<Quote>>> {
    Ok(Json(state.cache.batch(&body.codes, query.force_refresh).await))
}
