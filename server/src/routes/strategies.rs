// server/src/routes/strategies.rs
use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use serde::Deserialize;
use shared_models::{Market, Strategy};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct MarketQuery {
    pub market: Market,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<MarketQuery>,
) -> ApiResult<Json<Vec<Strategy>>> {
    Ok(Json(state.store.list_strategies(user_id, query.market)?))
}

#[derive(Deserialize)]
pub struct CreateStrategyRequest {
    pub name: String,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<MarketQuery>,
    Json(body): Json<CreateStrategyRequest>,
) -> ApiResult<Json<Strategy>> {
    Ok(Json(state.store.create_strategy(user_id, &body.name, query.market).await?))
}

pub async fn delete_one(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Query(_query): Query<MarketQuery>,
) -> ApiResult<()> {
    state.store.delete_strategy(user_id, id).await?;
    Ok(())
}

#[derive(serde::Serialize)]
pub struct DeleteAllResponse {
    pub deleted_count: usize,
}

pub async fn delete_all(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<MarketQuery>,
) -> ApiResult<Json<DeleteAllResponse>> {
    let deleted_count = state.store.delete_all_strategies(user_id, query.market).await?;
    Ok(Json(DeleteAllResponse { deleted_count }))
}
