// server/src/routes/positions.rs
use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use ledger::{ClosePositionInput, UpdateTradePatch};
use serde::Deserialize;
use shared_models::{AlertDirection, PositionView, TradeEvent};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StrategyQuery {
    pub strategy_id: i64,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<StrategyQuery>,
) -> ApiResult<Json<Vec<PositionView>>> {
    Ok(Json(state.store.positions(user_id, query.strategy_id)?))
}

#[derive(Deserialize, Default)]
pub struct UpdatePositionRequest {
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub stop_loss_alert: Option<bool>,
    pub take_profit_alert: Option<bool>,
}

pub async fn update(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(trade_id): Path<i64>,
    Query(query): Query<StrategyQuery>,
    Json(body): Json<UpdatePositionRequest>,
) -> ApiResult<Json<TradeEvent>> {
    let patch = UpdateTradePatch {
        stop_loss_price: body.stop_loss_price,
        take_profit_price: body.take_profit_price,
        stop_loss_alert: body.stop_loss_alert,
        take_profit_alert: body.take_profit_alert,
        ..Default::default()
    };
    Ok(Json(state.store.update_trade(user_id, query.strategy_id, trade_id, patch).await?))
}

#[derive(Deserialize)]
pub struct ClosePositionRequest {
    pub close_price: f64,
    pub close_time: DateTime<Utc>,
    pub shares: Option<f64>,
    #[serde(default)]
    pub commission_sell: f64,
}

pub async fn take_profit(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(trade_id): Path<i64>,
    Query(query): Query<StrategyQuery>,
    Json(body): Json<ClosePositionRequest>,
) -> ApiResult<Json<TradeEvent>> {
    close(state, user_id, query.strategy_id, trade_id, body, AlertDirection::TakeProfit).await
}

pub async fn stop_loss(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(trade_id): Path<i64>,
    Query(query): Query<StrategyQuery>,
    Json(body): Json<ClosePositionRequest>,
) -> ApiResult<Json<TradeEvent>> {
    close(state, user_id, query.strategy_id, trade_id, body, AlertDirection::StopLoss).await
}

async fn close(
    state: AppState,
    user_id: i64,
    strategy_id: i64,
    trade_id: i64,
    body: ClosePositionRequest,
    direction: AlertDirection,
) -> ApiResult<Json<TradeEvent>> {
    let input = ClosePositionInput {
        close_price: body.close_price,
        close_time: body.close_time,
        shares: body.shares,
        commission_sell: body.commission_sell,
        direction,
    };
    Ok(Json(state.store.close_position(user_id, strategy_id, trade_id, input).await?))
}
