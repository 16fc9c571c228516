// server/src/routes/forex.rs
//! The forex mirror surface (spec.md §6 "Forex (analogous surface)"). Stock
//! and forex trades share the same `ledger::Store`, parameterized by
//! `Market::Forex` on the strategy — these handlers are thin renamings of
//! `trades`/`positions`/`capital`/`prices` onto that vocabulary.
use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use ledger::{BillingContext, ClosePositionInput, CreateTradeInput, UpdateTradePatch};
use serde::{Deserialize, Serialize};
use shared_models::{AlertDirection, CapitalHistoryPoint, PositionView, Quote, Side, TradeEvent};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::capital::CapitalResponse;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StrategyQuery {
    pub strategy_id: i64,
}

pub async fn account(
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
pub struct SetInitialRequest {
    pub capital: f64,
    pub date: Option<NaiveDate>,
}

pub async fn set_initial(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<StrategyQuery>,
    Json(body): Json<SetInitialRequest>,
) -> ApiResult<()> {
    state
        .store
        .set_anchor(user_id, query.strategy_id, ledger::SetAnchorInput { amount: body.capital, date: body.date })
        .await?;
    Ok(())
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub deleted_count: usize,
}

pub async fn reset(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<StrategyQuery>,
) -> ApiResult<Json<ResetResponse>> {
    let deleted_count = state.store.clear_all_trades(user_id, query.strategy_id).await?;
    Ok(Json(ResetResponse { deleted_count }))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub strategy_id: i64,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    50
}

#[derive(Serialize)]
pub struct TradeListResponse {
    pub items: Vec<TradeEvent>,
    pub total: usize,
    pub page: u32,
    pub total_pages: u32,
}

pub async fn list_trades(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<TradeListResponse>> {
    let (items, total) = state.store.list_trades(user_id, query.strategy_id, query.page, query.page_size)?;
    let total_pages = super::trades::total_pages(total, query.page_size);
    Ok(Json(TradeListResponse { items, total, page: query.page, total_pages }))
}

#[derive(Deserialize)]
pub struct CreateForexTradeRequest {
    pub instrument_code: String,
    pub instrument_name: Option<String>,
    pub side: Side,
    pub lots: Option<f64>,
    pub risk_per_trade: Option<f64>,
    pub open_time: DateTime<Utc>,
    pub open_price: f64,
    pub close_time: Option<DateTime<Utc>>,
    pub close_price: Option<f64>,
    #[serde(default)]
    pub commission_buy: f64,
    #[serde(default)]
    pub commission_sell: f64,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    #[serde(default)]
    pub stop_loss_alert: bool,
    #[serde(default)]
    pub take_profit_alert: bool,
    pub note: Option<String>,
}

impl From<CreateForexTradeRequest> for CreateTradeInput {
    fn from(r: CreateForexTradeRequest) -> Self {
        CreateTradeInput {
            instrument_code: r.instrument_code,
            instrument_name: r.instrument_name,
            side: r.side,
            shares: r.lots,
            risk_per_trade: r.risk_per_trade,
            open_time: r.open_time,
            open_price: r.open_price,
            close_time: r.close_time,
            close_price: r.close_price,
            commission_buy: r.commission_buy,
            commission_sell: r.commission_sell,
            stop_loss_price: r.stop_loss_price,
            take_profit_price: r.take_profit_price,
            stop_loss_alert: r.stop_loss_alert,
            take_profit_alert: r.take_profit_alert,
            note: r.note,
        }
    }
}

pub async fn create_trade(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<StrategyQuery>,
    Json(body): Json<CreateForexTradeRequest>,
) -> ApiResult<Json<TradeEvent>> {
    let user = state.users.find_by_id(user_id)?.ok_or(ApiError::NotFound)?;
    let billing = BillingContext { billing_enabled: state.config.billing_enabled, is_paid: user.billing.is_paid };
    let trade = state.store.create_trade(user_id, query.strategy_id, body.into(), billing).await?;
    Ok(Json(trade))
}

#[derive(Deserialize, Default)]
pub struct UpdateForexTradeRequest {
    pub instrument_name: Option<String>,
    pub lots: Option<f64>,
    pub open_time: Option<DateTime<Utc>>,
    pub open_price: Option<f64>,
    pub close_time: Option<DateTime<Utc>>,
    pub close_price: Option<f64>,
    pub commission_buy: Option<f64>,
    pub commission_sell: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub stop_loss_alert: Option<bool>,
    pub take_profit_alert: Option<bool>,
    pub note: Option<String>,
}

impl From<UpdateForexTradeRequest> for UpdateTradePatch {
    fn from(r: UpdateForexTradeRequest) -> Self {
        UpdateTradePatch {
            instrument_name: r.instrument_name,
            shares: r.lots,
            open_time: r.open_time,
            open_price: r.open_price,
            close_time: r.close_time,
            close_price: r.close_price,
            commission_buy: r.commission_buy,
            commission_sell: r.commission_sell,
            stop_loss_price: r.stop_loss_price,
            take_profit_price: r.take_profit_price,
            stop_loss_alert: r.stop_loss_alert,
            take_profit_alert: r.take_profit_alert,
            note: r.note,
        }
    }
}

pub async fn update_trade(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Query(query): Query<StrategyQuery>,
    Json(body): Json<UpdateForexTradeRequest>,
) -> ApiResult<Json<TradeEvent>> {
    Ok(Json(state.store.update_trade(user_id, query.strategy_id, id, body.into()).await?))
}

pub async fn delete_trade(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Query(query): Query<StrategyQuery>,
) -> ApiResult<()> {
    state.store.delete_trade(user_id, query.strategy_id, id).await?;
    Ok(())
}

#[derive(Deserialize)]
pub struct CloseTradeRequest {
    pub close_price: f64,
    pub close_time: DateTime<Utc>,
    pub lots: Option<f64>,
    #[serde(default)]
    pub commission_sell: f64,
    pub direction: AlertDirection,
}

pub async fn close_trade(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Query(query): Query<StrategyQuery>,
    Json(body): Json<CloseTradeRequest>,
) -> ApiResult<Json<TradeEvent>> {
    let input = ClosePositionInput {
        close_price: body.close_price,
        close_time: body.close_time,
        shares: body.lots,
        commission_sell: body.commission_sell,
        direction: body.direction,
    };
    Ok(Json(state.store.close_position(user_id, query.strategy_id, id, input).await?))
}

#[derive(Serialize)]
pub struct ClearAllResponse {
    pub deleted_count: usize,
}

pub async fn clear_all(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<StrategyQuery>,
) -> ApiResult<Json<ClearAllResponse>> {
    let deleted_count = state.store.clear_all_trades(user_id, query.strategy_id).await?;
    Ok(Json(ClearAllResponse { deleted_count }))
}

pub async fn positions(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<StrategyQuery>,
) -> ApiResult<Json<Vec<PositionView>>> {
    Ok(Json(state.store.positions(user_id, query.strategy_id)?))
}

#[derive(Deserialize)]
pub struct CapitalHistoryQuery {
    pub strategy_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

pub async fn capital_history(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<CapitalHistoryQuery>,
) -> ApiResult<Json<Vec<CapitalHistoryPoint>>> {
    Ok(Json(state.store.capital_history(user_id, query.strategy_id, query.start_date, query.end_date)?))
}

#[derive(Deserialize)]
pub struct QuotesRequest {
    pub codes: Vec<String>,
}

pub async fn quotes(
    State(state): State<AppState>,
    Query(query): Query<super::prices::ForceQuery>,
    Json(body): Json<QuotesRequest>,
) -> ApiResult<Json<Vec<Quote>>> {
    Ok(Json(state.cache.batch(&body.codes, query.force_refresh).await))
}
