// server/src/routes/capital.rs
use std::collections::HashMap;

use axum::extract::{Extension, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared_models::Market;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StrategyQuery {
    pub strategy_id: i64,
}

#[derive(Serialize)]
pub struct CapitalResponse {
    pub total_assets: f64,
    pub available_funds: f64,
    pub position_value: f64,
}

pub async fn today(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<StrategyQuery>,
) -> ApiResult<Json<CapitalResponse>> {
    let point = state.store.capital_today(user_id, query.strategy_id)?;
    Ok(Json(CapitalResponse {
        total_assets: point.total_assets,
        available_funds: point.available_funds,
        position_value: point.position_value,
    }))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub strategy_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Serialize)]
pub struct HistoryPointResponse {
    pub date: NaiveDate,
    pub capital: f64,
    pub available_funds: f64,
    pub position_value: f64,
}

pub async fn history(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<HistoryPointResponse>>> {
    let points = state.store.capital_history(user_id, query.strategy_id, query.start_date, query.end_date)?;
    Ok(Json(
        points
            .into_iter()
            .map(|p| HistoryPointResponse {
                date: p.date,
                capital: p.total_assets,
                available_funds: p.available_funds,
                position_value: p.position_value,
            })
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct HistoriesByStrategyQuery {
    pub market: Market,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Serialize)]
pub struct StrategySummary {
    pub id: i64,
    pub name: String,
}

#[derive(Serialize)]
pub struct HistoriesByStrategyResponse {
    pub strategies: Vec<StrategySummary>,
    pub series_by_strategy_id: HashMap<i64, Vec<HistoryPointResponse>>,
}

pub async fn histories_by_strategy(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<HistoriesByStrategyQuery>,
) -> ApiResult<Json<HistoriesByStrategyResponse>> {
    let strategies = state.store.list_strategies(user_id, query.market)?;
    let mut series_by_strategy_id = HashMap::new();
    for s in &strategies {
        let points = state.store.capital_history(user_id, s.id, query.start_date, query.end_date)?;
        series_by_strategy_id.insert(
            s.id,
            points
                .into_iter()
                .map(|p| HistoryPointResponse {
                    date: p.date,
                    capital: p.total_assets,
                    available_funds: p.available_funds,
                    position_value: p.position_value,
                })
                .collect(),
        );
    }
    Ok(Json(HistoriesByStrategyResponse {
        strategies: strategies.into_iter().map(|s| StrategySummary { id: s.id, name: s.name }).collect(),
        series_by_strategy_id,
    }))
}

#[derive(Deserialize)]
pub struct SetAnchorRequest {
    pub capital: f64,
    pub date: Option<NaiveDate>,
}

pub async fn set_anchor(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<StrategyQuery>,
    Json(body): Json<SetAnchorRequest>,
) -> ApiResult<()> {
    state
        .store
        .set_anchor(user_id, query.strategy_id, ledger::SetAnchorInput { amount: body.capital, date: body.date })
        .await?;
    Ok(())
}
