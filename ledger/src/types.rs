// ledger/src/types.rs
//! Inputs to the mutation API. Kept distinct from `shared_models::TradeEvent`
//! because callers never supply every derived field (status, ratios, …).

use chrono::{DateTime, NaiveDate, Utc};
use shared_models::{AlertDirection, Side};

#[derive(Debug, Clone, Default)]
pub struct CreateTradeInput {
    pub instrument_code: String,
    pub instrument_name: Option<String>,
    pub side: Side,
    /// Exactly one of `shares` or `risk_per_trade` must be supplied.
    pub shares: Option<f64>,
    pub risk_per_trade: Option<f64>,
    pub open_time: DateTime<Utc>,
    pub open_price: f64,
    pub close_time: Option<DateTime<Utc>>,
    pub close_price: Option<f64>,
    pub commission_buy: f64,
    pub commission_sell: f64,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub stop_loss_alert: bool,
    pub take_profit_alert: bool,
    pub note: Option<String>,
}

/// `billing_enabled` is the deployment flag (spec.md §6 `admin_settings`);
/// `is_paid` is the caller's current billing status. Passed in by the edge
/// rather than looked up here, since the `users` table is owned by the
/// edge's auth store, not by the ledger.
#[derive(Debug, Clone, Copy)]
pub struct BillingContext {
    pub billing_enabled: bool,
    pub is_paid: bool,
}

impl BillingContext {
    pub fn allows_trade_creation(&self) -> bool {
        !self.billing_enabled || self.is_paid
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTradePatch {
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

#[derive(Debug, Clone)]
pub struct ClosePositionInput {
    pub close_price: f64,
    pub close_time: DateTime<Utc>,
    /// Defaults to the position's full remaining size when absent.
    pub shares: Option<f64>,
    pub commission_sell: f64,
    pub direction: AlertDirection,
}

#[derive(Debug, Clone, Copy)]
pub struct SetAnchorInput {
    pub amount: f64,
    pub date: Option<NaiveDate>,
}
