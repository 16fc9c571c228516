// ledger/src/reads.rs
//! Shared read-side SQL. These helpers never mutate and never take the
//! per-strategy lock: read paths never take it.
//! `store.rs` calls into them both from the public read methods and from
//! inside a mutation's own recompute step.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use shared_models::{CapitalAnchor, CapitalHistoryPoint, Market, Strategy, TradeEvent};

use crate::model::{parse_date, row_to_trade, TRADE_COLUMNS};
use crate::Error;

pub(crate) fn fetch_trades(conn: &Connection, strategy_id: i64) -> Result<Vec<TradeEvent>, Error> {
    let sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE strategy_id = ?1 AND is_deleted = 0");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![strategy_id], row_to_trade)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

pub(crate) fn fetch_trade(conn: &Connection, trade_id: i64) -> Result<Option<TradeEvent>, Error> {
    let sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1");
    conn.query_row(&sql, params![trade_id], row_to_trade)
        .optional()
        .map_err(Error::from)
}

pub(crate) fn fetch_anchor(conn: &Connection, strategy_id: i64) -> Result<Option<CapitalAnchor>, Error> {
    conn.query_row(
        "SELECT strategy_id, amount, date FROM capital_anchors WHERE strategy_id = ?1",
        params![strategy_id],
        |row| {
            let date: String = row.get(2)?;
            Ok((row.get(0)?, row.get(1)?, date))
        },
    )
    .optional()?
    .map(|(strategy_id, amount, date): (i64, f64, String)| {
        Ok(CapitalAnchor {
            strategy_id,
            amount,
            date: parse_date(&date)?,
        })
    })
    .transpose()
}

pub(crate) fn fetch_strategy(conn: &Connection, strategy_id: i64) -> Result<Option<Strategy>, Error> {
    conn.query_row(
        "SELECT id, user_id, name, market, initial_capital, initial_date FROM strategies WHERE id = ?1 AND is_deleted = 0",
        params![strategy_id],
        |row| {
            let market: String = row.get(3)?;
            let initial_date: Option<String> = row.get(5)?;
            Ok((row.get(0)?, row.get(1)?, row.get::<_, String>(2)?, market, row.get(4)?, initial_date))
        },
    )
    .optional()?
    .map(|(id, user_id, name, market, initial_capital, initial_date): (i64, i64, String, String, Option<f64>, Option<String>)| {
        Ok(Strategy {
            id,
            user_id,
            name,
            market: market.parse::<Market>().map_err(Error::Internal)?,
            initial_capital,
            initial_date: initial_date.map(|d| parse_date(&d)).transpose()?,
        })
    })
    .transpose()
}

/// Loads a strategy and checks it is owned by `user_id`, returning
/// [`Error::NotFound`] both when the row is missing and when it belongs to
/// someone else — cross-user access is never distinguishable from absence.
pub(crate) fn fetch_owned_strategy(conn: &Connection, user_id: i64, strategy_id: i64) -> Result<Strategy, Error> {
    match fetch_strategy(conn, strategy_id)? {
        Some(s) if s.user_id == user_id => Ok(s),
        _ => Err(Error::NotFound),
    }
}

pub(crate) fn fetch_capital_history(
    conn: &Connection,
    strategy_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<CapitalHistoryPoint>, Error> {
    let mut stmt = conn.prepare(
        "SELECT strategy_id, date, total_assets, available_funds, position_value
         FROM capital_history WHERE strategy_id = ?1 AND date >= ?2 AND date <= ?3
         ORDER BY date ASC",
    )?;
    let rows = stmt.query_map(
        params![strategy_id, start.format("%Y-%m-%d").to_string(), end.format("%Y-%m-%d").to_string()],
        |row| {
            let date: String = row.get(1)?;
            Ok((row.get(0)?, date, row.get(2)?, row.get(3)?, row.get(4)?))
        },
    )?;
    rows.collect::<rusqlite::Result<Vec<(i64, String, f64, f64, f64)>>>()?
        .into_iter()
        .map(|(strategy_id, date, total_assets, available_funds, position_value)| {
            Ok(CapitalHistoryPoint {
                strategy_id,
                date: parse_date(&date)?,
                total_assets,
                available_funds,
                position_value,
            })
        })
        .collect()
}

/// Atomically replaces every stored history point for `strategy_id` with
/// `points` — the recomputer is the only writer (spec.md §4.3.2 step 4).
pub(crate) fn replace_capital_history(
    conn: &Connection,
    strategy_id: i64,
    points: &[CapitalHistoryPoint],
) -> Result<(), Error> {
    conn.execute("DELETE FROM capital_history WHERE strategy_id = ?1", params![strategy_id])?;
    let mut stmt = conn.prepare(
        "INSERT INTO capital_history (strategy_id, date, total_assets, available_funds, position_value)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for p in points {
        stmt.execute(params![
            p.strategy_id,
            p.date.format("%Y-%m-%d").to_string(),
            p.total_assets,
            p.available_funds,
            p.position_value,
        ])?;
    }
    Ok(())
}
