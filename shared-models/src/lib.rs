// shared-models/src/lib.rs
//! Types shared between the ledger, price cache, monitor, notifier and edge
//! crates. Nothing here owns storage or behaviour — it is the vocabulary the
//! rest of the workspace talks in.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Market a strategy is scoped to. Stocks are long-only (A-share); forex
/// trades carry an explicit side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Stock,
    Forex,
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Market::Stock => write!(f, "stock"),
            Market::Forex => write!(f, "forex"),
        }
    }
}

impl std::str::FromStr for Market {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stock" => Ok(Market::Stock),
            "forex" => Ok(Market::Forex),
            other => Err(format!("unknown market: {other}")),
        }
    }
}

/// Long-only for stocks, explicit direction for forex. Stored on every
/// trade event even for stocks, where it is always `Buy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Default for Side {
    fn default() -> Self {
        Side::Buy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// Why a trade was closed. `Manual` covers both edge-initiated closes and
/// trades created already-closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderResult {
    StopLoss,
    TakeProfit,
    Manual,
}

/// Direction of a monitor alert; doubles as the rate-limit key component
/// and the latch key component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertDirection {
    StopLoss,
    TakeProfit,
}

impl std::fmt::Display for AlertDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertDirection::StopLoss => write!(f, "stop_loss"),
            AlertDirection::TakeProfit => write!(f, "take_profit"),
        }
    }
}

/// A named, market-scoped ledger owned by a user. Strategies are
/// independent ledgers; there is no cross-strategy aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub market: Market,
    pub initial_capital: Option<f64>,
    pub initial_date: Option<NaiveDate>,
}

/// The fundamental log record: a buy that is open, closed in one or more
/// stages, or recorded already closed. See spec.md §3 for the full
/// invariant list; the recomputer and the edge both operate on this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub id: i64,
    pub user_id: i64,
    pub strategy_id: i64,
    pub instrument_code: String,
    pub instrument_name: Option<String>,
    pub side: Side,
    /// Shares (stocks, integral) or lots (forex, 4 decimal places).
    pub shares: f64,
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
    pub status: TradeStatus,
    pub order_result: Option<OrderResult>,
    pub is_deleted: bool,
    pub parent_trade_id: Option<i64>,
    pub note: Option<String>,
    /// `(take_profit - open) / (open - stop_loss)`, computed at insert time
    /// when both stops are present.
    pub theoretical_risk_reward_ratio: Option<f64>,
}

/// The user-declared `(amount, date)` that seeds a strategy's ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CapitalAnchor {
    pub strategy_id: i64,
    pub amount: f64,
    pub date: NaiveDate,
}

/// One derived daily sample of a strategy's capital history. Persisted,
/// never edited directly — `ledger::recompute` is the only writer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CapitalHistoryPoint {
    pub strategy_id: i64,
    pub date: NaiveDate,
    pub total_assets: f64,
    pub available_funds: f64,
    pub position_value: f64,
}

/// A partial-close child as it appears inside its parent's `PositionView`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialClose {
    pub trade_id: i64,
    pub shares: f64,
    pub close_time: DateTime<Utc>,
    pub close_price: f64,
    pub order_result: Option<OrderResult>,
}

/// The currently open lot of one instrument under one strategy, derived at
/// read time from the event log. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionView {
    pub trade_id: i64,
    pub strategy_id: i64,
    pub instrument_code: String,
    pub instrument_name: Option<String>,
    pub side: Side,
    pub remaining_shares: f64,
    pub avg_open_price: f64,
    pub opened_shares: f64,
    pub closed_shares: f64,
    pub partial_closes: Vec<PartialClose>,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub stop_loss_alert: bool,
    pub take_profit_alert: bool,
}

/// `(user, instrument, direction) -> last_sent_at`, used by the notifier
/// for rate limiting. Persisted so a restart does not re-send a burst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDeliveryRecord {
    pub user_id: i64,
    pub instrument_code: String,
    pub direction: AlertDirection,
    pub last_sent_at: DateTime<Utc>,
}

/// A fresh quote for one instrument, as returned by the price cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub code: String,
    pub price: f64,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// Emitted by the monitor (C4) when a configured threshold is crossed,
/// consumed by the notifier (C5). Carries everything needed to render the
/// email without a second lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub user_id: i64,
    pub strategy_id: i64,
    pub trade_id: i64,
    pub instrument_code: String,
    pub instrument_name: Option<String>,
    pub direction: AlertDirection,
    pub price: f64,
    pub target: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Billing tuple carried on `User`, and the answer to
/// `GET /api/user/billing-status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Billing {
    pub is_paid: bool,
    pub paid_until: Option<NaiveDate>,
    pub plan: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub email_alerts_enabled: bool,
    pub billing: Billing,
}
