// server/src/routes/trades.rs
use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use ledger::{BillingContext, CreateTradeInput, TradeStatistics, UpdateTradePatch};
use serde::{Deserialize, Serialize};
use shared_models::{Side, TradeEvent};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StrategyQuery {
    pub strategy_id: i64,
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

pub async fn list(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<TradeListResponse>> {
    let (items, total) = state.store.list_trades(user_id, query.strategy_id, query.page, query.page_size)?;
    let total_pages = total_pages(total, query.page_size);
    Ok(Json(TradeListResponse { items, total, page: query.page, total_pages }))
}

pub(crate) fn total_pages(total: usize, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    ((total as u64 + page_size as u64 - 1) / page_size as u64) as u32
}

#[derive(Deserialize)]
pub struct CreateTradeRequest {
    pub instrument_code: String,
    pub instrument_name: Option<String>,
    pub side: Side,
    pub shares: Option<f64>,
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

impl From<CreateTradeRequest> for CreateTradeInput {
    fn from(r: CreateTradeRequest) -> Self {
        CreateTradeInput {
            instrument_code: r.instrument_code,
            instrument_name: r.instrument_name,
            side: r.side,
            shares: r.shares,
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

pub async fn create(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<StrategyQuery>,
    Json(body): Json<CreateTradeRequest>,
) -> ApiResult<Json<TradeEvent>> {
    let user = state.users.find_by_id(user_id)?.ok_or(ApiError::NotFound)?;
    let billing = BillingContext { billing_enabled: state.config.billing_enabled, is_paid: user.billing.is_paid };
    let trade = state.store.create_trade(user_id, query.strategy_id, body.into(), billing).await?;
    Ok(Json(trade))
}

pub async fn on_date(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(date): Path<NaiveDate>,
    Query(query): Query<StrategyQuery>,
) -> ApiResult<Json<Vec<TradeEvent>>> {
    Ok(Json(state.store.trades_on_date(user_id, query.strategy_id, date)?))
}

pub async fn dates(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<StrategyQuery>,
) -> ApiResult<Json<Vec<NaiveDate>>> {
    Ok(Json(state.store.trade_dates(user_id, query.strategy_id)?))
}

#[derive(Serialize)]
pub struct StockCode {
    pub code: String,
    pub name: Option<String>,
}

pub async fn stock_codes(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<StrategyQuery>,
) -> ApiResult<Json<Vec<StockCode>>> {
    let codes = state.store.stock_codes(user_id, query.strategy_id)?;
    Ok(Json(codes.into_iter().map(|(code, name)| StockCode { code, name }).collect()))
}

#[derive(Serialize)]
pub struct TradesForCodeResponse {
    pub trades: Vec<TradeEvent>,
    pub statistics: TradeStatistics,
}

pub async fn for_code(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(code): Path<String>,
    Query(query): Query<StrategyQuery>,
) -> ApiResult<Json<TradesForCodeResponse>> {
    let (trades, statistics) = state.store.trades_for_code(user_id, query.strategy_id, &code)?;
    Ok(Json(TradesForCodeResponse { trades, statistics }))
}

#[derive(Deserialize, Default)]
pub struct UpdateTradeRequest {
    pub instrument_name: Option<String>,
    pub shares: Option<f64>,
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

impl From<UpdateTradeRequest> for UpdateTradePatch {
    fn from(r: UpdateTradeRequest) -> Self {
        UpdateTradePatch {
            instrument_name: r.instrument_name,
            shares: r.shares,
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

pub async fn update(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Query(query): Query<StrategyQuery>,
    Json(body): Json<UpdateTradeRequest>,
) -> ApiResult<Json<TradeEvent>> {
    Ok(Json(state.store.update_trade(user_id, query.strategy_id, id, body.into()).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Query(query): Query<StrategyQuery>,
) -> ApiResult<()> {
    state.store.delete_trade(user_id, query.strategy_id, id).await?;
    Ok(())
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
