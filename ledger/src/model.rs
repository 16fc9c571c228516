// ledger/src/model.rs
//! Row <-> domain-type conversions. Kept in one place so the SQL column
//! order only needs to match the `Row::get` indices here.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Row;
use shared_models::{OrderResult, Side, TradeEvent, TradeStatus};

use crate::Error;

pub(crate) const TRADE_COLUMNS: &str = "id, user_id, strategy_id, instrument_code, instrument_name, side, shares, open_time, open_price, close_time, close_price, commission_buy, commission_sell, stop_loss_price, take_profit_price, stop_loss_alert, take_profit_alert, status, order_result, is_deleted, parent_trade_id, note, theoretical_risk_reward_ratio";

pub(crate) fn side_to_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

pub(crate) fn side_from_str(s: &str) -> Result<Side, Error> {
    match s {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(Error::Internal(format!("unknown side in storage: {other}"))),
    }
}

pub(crate) fn status_to_str(status: TradeStatus) -> &'static str {
    match status {
        TradeStatus::Open => "open",
        TradeStatus::Closed => "closed",
    }
}

pub(crate) fn status_from_str(s: &str) -> Result<TradeStatus, Error> {
    match s {
        "open" => Ok(TradeStatus::Open),
        "closed" => Ok(TradeStatus::Closed),
        other => Err(Error::Internal(format!("unknown status in storage: {other}"))),
    }
}

pub(crate) fn order_result_to_str(result: OrderResult) -> &'static str {
    match result {
        OrderResult::StopLoss => "stop_loss",
        OrderResult::TakeProfit => "take_profit",
        OrderResult::Manual => "manual",
    }
}

pub(crate) fn order_result_from_str(s: &str) -> Result<OrderResult, Error> {
    match s {
        "stop_loss" => Ok(OrderResult::StopLoss),
        "take_profit" => Ok(OrderResult::TakeProfit),
        "manual" => Ok(OrderResult::Manual),
        other => Err(Error::Internal(format!("unknown order_result in storage: {other}"))),
    }
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp in storage {s:?}: {e}")))
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::Internal(format!("bad date in storage {s:?}: {e}")))
}

/// Maps a row selected with [`TRADE_COLUMNS`] in that exact order.
pub(crate) fn row_to_trade(row: &Row) -> rusqlite::Result<TradeEvent> {
    let side: String = row.get(5)?;
    let open_time: String = row.get(7)?;
    let close_time: Option<String> = row.get(9)?;
    let status: String = row.get(17)?;
    let order_result: Option<String> = row.get(18)?;

    Ok(TradeEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        strategy_id: row.get(2)?,
        instrument_code: row.get(3)?,
        instrument_name: row.get(4)?,
        side: side_from_str(&side).unwrap_or(Side::Buy),
        shares: row.get(6)?,
        open_time: parse_datetime(&open_time).unwrap_or_else(|_| Utc::now()),
        open_price: row.get(8)?,
        close_time: close_time.map(|s| parse_datetime(&s).unwrap_or_else(|_| Utc::now())),
        close_price: row.get(10)?,
        commission_buy: row.get(11)?,
        commission_sell: row.get(12)?,
        stop_loss_price: row.get(13)?,
        take_profit_price: row.get(14)?,
        stop_loss_alert: row.get::<_, i64>(15)? != 0,
        take_profit_alert: row.get::<_, i64>(16)? != 0,
        status: status_from_str(&status).unwrap_or(TradeStatus::Open),
        order_result: order_result.and_then(|s| order_result_from_str(&s).ok()),
        is_deleted: row.get::<_, i64>(19)? != 0,
        parent_trade_id: row.get(20)?,
        note: row.get(21)?,
        theoretical_risk_reward_ratio: row.get(22)?,
    })
}
