// ledger/src/store.rs
//! `Store` is C3's public face: every mutation in spec.md §4.3.1, plus the
//! read-side queries the edge needs to serve §6. Mutations are serialized
//! per `(user_id, strategy_id)` via [`crate::lock::StrategyLocks`] and run
//! inside a single `rusqlite` transaction together with the recompute they
//! trigger (spec.md §4.3.4): either both the mutation and the refreshed
//! capital history land, or neither does.

use std::sync::{Arc, Mutex as StdMutex};

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use rusqlite::{params, Connection, OptionalExtension};
use shared_models::{
    AlertDirection, CapitalHistoryPoint, Market, OrderResult, PositionView, Strategy, TradeEvent, TradeStatus,
};

use crate::lock::StrategyLocks;
use crate::model::{
    order_result_to_str, parse_date, row_to_trade, side_to_str, status_to_str, TRADE_COLUMNS,
};
use crate::positions::compute_positions;
use crate::reads;
use crate::recompute::{compute_history, with_strategy_id};
use crate::schema;
use crate::types::{BillingContext, ClosePositionInput, CreateTradeInput, SetAnchorInput, UpdateTradePatch};
use crate::Error;

pub type Result<T> = std::result::Result<T, Error>;

pub struct Store {
    conn: Arc<StdMutex<Connection>>,
    locks: StrategyLocks,
    tz: Tz,
}

impl Store {
    pub fn new(conn: Connection, tz: Tz) -> Result<Self> {
        schema::init(&conn)?;
        Ok(Self {
            conn: Arc::new(StdMutex::new(conn)),
            locks: StrategyLocks::new(),
            tz,
        })
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    /// Runs `f` with an exclusive lock on `(user_id, strategy_id)` held for
    /// its whole duration, per spec.md §5. `f` gets the raw connection and
    /// is expected to open its own `Transaction` when it mutates.
    async fn with_strategy_lock<F, T>(&self, user_id: i64, strategy_id: i64, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let _guard = self.locks.acquire(user_id, strategy_id).await;
        let mut conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        f(&mut conn)
    }

    /// Recomputes and persists the capital history for `strategy_id` from
    /// the live trade log — spec.md §4.3.2. Caller must already be inside a
    /// transaction and already hold the strategy lock.
    fn recompute_locked(&self, conn: &Connection, strategy_id: i64) -> Result<()> {
        let anchor = reads::fetch_anchor(conn, strategy_id)?;
        let trades = reads::fetch_trades(conn, strategy_id)?;
        let points = with_strategy_id(compute_history(&trades, anchor, self.today(), self.tz), strategy_id);
        reads::replace_capital_history(conn, strategy_id, &points)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Strategies
    // ---------------------------------------------------------------

    pub async fn create_strategy(&self, user_id: i64, name: &str, market: Market) -> Result<Strategy> {
        if name.trim().is_empty() {
            return Err(Error::Validation("strategy name must not be empty".into()));
        }
        let name = name.to_string();
        self.with_strategy_lock(user_id, 0, move |conn| {
            conn.execute(
                "INSERT INTO strategies (user_id, name, market) VALUES (?1, ?2, ?3)",
                params![user_id, name, market.to_string()],
            )?;
            let id = conn.last_insert_rowid();
            Ok(Strategy {
                id,
                user_id,
                name,
                market,
                initial_capital: None,
                initial_date: None,
            })
        })
        .await
    }

    pub fn list_strategies(&self, user_id: i64, market: Market) -> Result<Vec<Strategy>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, market, initial_capital, initial_date
             FROM strategies WHERE user_id = ?1 AND market = ?2 AND is_deleted = 0
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![user_id, market.to_string()], |row| {
            let market: String = row.get(3)?;
            let initial_date: Option<String> = row.get(5)?;
            Ok((row.get(0)?, row.get(1)?, row.get::<_, String>(2)?, market, row.get(4)?, initial_date))
        })?;
        rows.collect::<rusqlite::Result<Vec<(i64, i64, String, String, Option<f64>, Option<String>)>>>()?
            .into_iter()
            .map(|(id, user_id, name, market, initial_capital, initial_date)| {
                Ok(Strategy {
                    id,
                    user_id,
                    name,
                    market: market.parse::<Market>().map_err(Error::Internal)?,
                    initial_capital,
                    initial_date: initial_date.map(|d| parse_date(&d)).transpose()?,
                })
            })
            .collect()
    }

    /// Soft-deletes the strategy, its trades, and erases its capital history
    /// and anchor — spec.md §3 lifecycle, §4.3.1 `delete_strategy`. Emits no
    /// recomputation: the history is simply gone.
    pub async fn delete_strategy(&self, user_id: i64, strategy_id: i64) -> Result<()> {
        self.with_strategy_lock(user_id, strategy_id, move |conn| {
            let tx = conn.transaction()?;
            reads::fetch_owned_strategy(&tx, user_id, strategy_id)?;
            tx.execute(
                "UPDATE trades SET is_deleted = 1 WHERE strategy_id = ?1",
                params![strategy_id],
            )?;
            tx.execute("DELETE FROM capital_anchors WHERE strategy_id = ?1", params![strategy_id])?;
            tx.execute("DELETE FROM capital_history WHERE strategy_id = ?1", params![strategy_id])?;
            tx.execute(
                "UPDATE strategies SET is_deleted = 1 WHERE id = ?1 AND user_id = ?2",
                params![strategy_id, user_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn delete_all_strategies(&self, user_id: i64, market: Market) -> Result<usize> {
        let ids: Vec<i64> = {
            let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
            let mut stmt = conn.prepare(
                "SELECT id FROM strategies WHERE user_id = ?1 AND market = ?2 AND is_deleted = 0",
            )?;
            let rows = stmt.query_map(params![user_id, market.to_string()], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<i64>>>()?
        };
        for id in &ids {
            self.delete_strategy(user_id, *id).await?;
        }
        Ok(ids.len())
    }

    // ---------------------------------------------------------------
    // Anchors
    // ---------------------------------------------------------------

    pub async fn set_anchor(&self, user_id: i64, strategy_id: i64, input: SetAnchorInput) -> Result<()> {
        let today = self.today();
        self.with_strategy_lock(user_id, strategy_id, move |conn| {
            let tx = conn.transaction()?;
            reads::fetch_owned_strategy(&tx, user_id, strategy_id)?;
            let date = input.date.unwrap_or(today);
            tx.execute(
                "INSERT INTO capital_anchors (strategy_id, amount, date) VALUES (?1, ?2, ?3)
                 ON CONFLICT(strategy_id) DO UPDATE SET amount = excluded.amount, date = excluded.date",
                params![strategy_id, input.amount, date.format("%Y-%m-%d").to_string()],
            )?;
            self.recompute_locked(&tx, strategy_id)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    // ---------------------------------------------------------------
    // Trades
    // ---------------------------------------------------------------

    pub async fn create_trade(
        &self,
        user_id: i64,
        strategy_id: i64,
        input: CreateTradeInput,
        billing: BillingContext,
    ) -> Result<TradeEvent> {
        if !billing.allows_trade_creation() {
            return Err(Error::BillingRequired);
        }
        if input.open_price <= 0.0 {
            return Err(Error::Validation("open_price must be > 0".into()));
        }

        let shares = match (input.shares, input.risk_per_trade) {
            (Some(shares), _) => {
                if shares <= 0.0 {
                    return Err(Error::Validation("shares must be > 0".into()));
                }
                shares
            }
            (None, Some(risk)) => {
                let stop_loss = input
                    .stop_loss_price
                    .ok_or_else(|| Error::Validation("risk_per_trade requires stop_loss_price".into()))?;
                if risk <= 0.0 {
                    return Err(Error::Validation("risk_per_trade must be > 0".into()));
                }
                if input.open_price <= stop_loss {
                    return Err(Error::Validation("open_price must be greater than stop_loss_price".into()));
                }
                (risk / (input.open_price - stop_loss)).ceil()
            }
            (None, None) => {
                return Err(Error::Validation("either shares or risk_per_trade must be supplied".into()))
            }
        };

        let ratio = theoretical_ratio(input.open_price, input.stop_loss_price, input.take_profit_price);
        let (status, order_result) = match (input.close_price, input.close_time) {
            (Some(p), Some(_)) if p > 0.0 => (TradeStatus::Closed, Some(OrderResult::Manual)),
            (Some(_), Some(_)) => return Err(Error::Validation("close_price must be > 0".into())),
            _ => (TradeStatus::Open, None),
        };

        self.with_strategy_lock(user_id, strategy_id, move |conn| {
            let tx = conn.transaction()?;
            reads::fetch_owned_strategy(&tx, user_id, strategy_id)?;

            tx.execute(
                "INSERT INTO trades (
                    user_id, strategy_id, instrument_code, instrument_name, side, shares,
                    open_time, open_price, close_time, close_price, commission_buy, commission_sell,
                    stop_loss_price, take_profit_price, stop_loss_alert, take_profit_alert,
                    status, order_result, is_deleted, parent_trade_id, note, theoretical_risk_reward_ratio
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,0,NULL,?19,?20)",
                params![
                    user_id,
                    strategy_id,
                    input.instrument_code,
                    input.instrument_name,
                    side_to_str(input.side),
                    shares,
                    input.open_time.to_rfc3339(),
                    input.open_price,
                    input.close_time.map(|t| t.to_rfc3339()),
                    input.close_price,
                    input.commission_buy,
                    input.commission_sell,
                    input.stop_loss_price,
                    input.take_profit_price,
                    input.stop_loss_alert as i64,
                    input.take_profit_alert as i64,
                    status_to_str(status),
                    order_result.map(order_result_to_str),
                    input.note,
                    ratio,
                ],
            )?;
            let id = tx.last_insert_rowid();
            self.recompute_locked(&tx, strategy_id)?;
            let sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1");
            let trade = tx.query_row(&sql, params![id], row_to_trade)?;
            tx.commit()?;
            Ok(trade)
        })
        .await
    }

    pub async fn update_trade(
        &self,
        user_id: i64,
        strategy_id: i64,
        trade_id: i64,
        patch: UpdateTradePatch,
    ) -> Result<TradeEvent> {
        self.with_strategy_lock(user_id, strategy_id, move |conn| {
            let tx = conn.transaction()?;
            reads::fetch_owned_strategy(&tx, user_id, strategy_id)?;
            let mut trade = reads::fetch_trade(&tx, trade_id)?
                .filter(|t| t.strategy_id == strategy_id && t.user_id == user_id && !t.is_deleted)
                .ok_or(Error::NotFound)?;

            if let Some(v) = patch.instrument_name {
                trade.instrument_name = Some(v);
            }
            if let Some(v) = patch.shares {
                if v <= 0.0 {
                    return Err(Error::Validation("shares must be > 0".into()));
                }
                trade.shares = v;
            }
            if let Some(v) = patch.open_time {
                trade.open_time = v;
            }
            if let Some(v) = patch.open_price {
                if v <= 0.0 {
                    return Err(Error::Validation("open_price must be > 0".into()));
                }
                trade.open_price = v;
            }
            if let Some(v) = patch.close_time {
                trade.close_time = Some(v);
            }
            if let Some(v) = patch.close_price {
                trade.close_price = Some(v);
            }
            if let Some(v) = patch.commission_buy {
                trade.commission_buy = v;
            }
            if let Some(v) = patch.commission_sell {
                trade.commission_sell = v;
            }
            if let Some(v) = patch.stop_loss_price {
                trade.stop_loss_price = Some(v);
            }
            if let Some(v) = patch.take_profit_price {
                trade.take_profit_price = Some(v);
            }
            if let Some(v) = patch.stop_loss_alert {
                trade.stop_loss_alert = v;
            }
            if let Some(v) = patch.take_profit_alert {
                trade.take_profit_alert = v;
            }
            if let Some(v) = patch.note {
                trade.note = Some(v);
            }

            // Setting both close fields on a still-open trade transitions it
            // to closed, per spec.md §4.3.1 `update_trade`.
            if trade.status == TradeStatus::Open && trade.close_price.is_some() && trade.close_time.is_some() {
                trade.status = TradeStatus::Closed;
                if trade.order_result.is_none() {
                    trade.order_result = Some(OrderResult::Manual);
                }
            }
            trade.theoretical_risk_reward_ratio =
                theoretical_ratio(trade.open_price, trade.stop_loss_price, trade.take_profit_price);

            tx.execute(
                "UPDATE trades SET instrument_name=?1, shares=?2, open_time=?3, open_price=?4, close_time=?5,
                 close_price=?6, commission_buy=?7, commission_sell=?8, stop_loss_price=?9, take_profit_price=?10,
                 stop_loss_alert=?11, take_profit_alert=?12, status=?13, order_result=?14, note=?15,
                 theoretical_risk_reward_ratio=?16 WHERE id=?17",
                params![
                    trade.instrument_name,
                    trade.shares,
                    trade.open_time.to_rfc3339(),
                    trade.open_price,
                    trade.close_time.map(|t| t.to_rfc3339()),
                    trade.close_price,
                    trade.commission_buy,
                    trade.commission_sell,
                    trade.stop_loss_price,
                    trade.take_profit_price,
                    trade.stop_loss_alert as i64,
                    trade.take_profit_alert as i64,
                    status_to_str(trade.status),
                    trade.order_result.map(order_result_to_str),
                    trade.note,
                    trade.theoretical_risk_reward_ratio,
                    trade_id,
                ],
            )?;
            self.recompute_locked(&tx, strategy_id)?;
            tx.commit()?;
            Ok(trade)
        })
        .await
    }

    pub async fn delete_trade(&self, user_id: i64, strategy_id: i64, trade_id: i64) -> Result<()> {
        self.with_strategy_lock(user_id, strategy_id, move |conn| {
            let tx = conn.transaction()?;
            reads::fetch_owned_strategy(&tx, user_id, strategy_id)?;
            reads::fetch_trade(&tx, trade_id)?
                .filter(|t| t.strategy_id == strategy_id && t.user_id == user_id && !t.is_deleted)
                .ok_or(Error::NotFound)?;
            tx.execute("UPDATE trades SET is_deleted = 1 WHERE id = ?1", params![trade_id])?;
            self.recompute_locked(&tx, strategy_id)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Implements both the "stop loss" and "take profit" edge actions
    /// (spec.md §4.3.1 `close_position`). Closes the parent in place if
    /// `shares` covers the whole remaining lot, otherwise spins off a
    /// partial-close child and prorates the buy commission.
    pub async fn close_position(
        &self,
        user_id: i64,
        strategy_id: i64,
        trade_id: i64,
        input: ClosePositionInput,
    ) -> Result<TradeEvent> {
        self.with_strategy_lock(user_id, strategy_id, move |conn| {
            let tx = conn.transaction()?;
            reads::fetch_owned_strategy(&tx, user_id, strategy_id)?;
            let parent = reads::fetch_trade(&tx, trade_id)?
                .filter(|t| t.strategy_id == strategy_id && t.user_id == user_id && !t.is_deleted)
                .ok_or(Error::NotFound)?;
            if parent.status != TradeStatus::Open {
                return Err(Error::Validation("position is not open".into()));
            }

            let close_shares = input.shares.unwrap_or(parent.shares);
            if close_shares <= 0.0 || close_shares > parent.shares {
                return Err(Error::Validation("close shares out of range".into()));
            }

            let order_result = match input.direction {
                AlertDirection::StopLoss => OrderResult::StopLoss,
                AlertDirection::TakeProfit => OrderResult::TakeProfit,
            };

            let result_trade = if close_shares >= parent.shares {
                tx.execute(
                    "UPDATE trades SET status=?1, order_result=?2, close_time=?3, close_price=?4, commission_sell=?5 WHERE id=?6",
                    params![
                        status_to_str(TradeStatus::Closed),
                        order_result_to_str(order_result),
                        input.close_time.to_rfc3339(),
                        input.close_price,
                        input.commission_sell,
                        trade_id,
                    ],
                )?;
                TradeEvent {
                    status: TradeStatus::Closed,
                    order_result: Some(order_result),
                    close_time: Some(input.close_time),
                    close_price: Some(input.close_price),
                    commission_sell: input.commission_sell,
                    ..parent
                }
            } else {
                let remaining = parent.shares - close_shares;
                let ratio = close_shares / parent.shares;
                let child_commission_buy = parent.commission_buy * ratio;
                let parent_commission_buy = parent.commission_buy - child_commission_buy;

                tx.execute(
                    "UPDATE trades SET shares=?1, commission_buy=?2 WHERE id=?3",
                    params![remaining, parent_commission_buy, trade_id],
                )?;

                tx.execute(
                    "INSERT INTO trades (
                        user_id, strategy_id, instrument_code, instrument_name, side, shares,
                        open_time, open_price, close_time, close_price, commission_buy, commission_sell,
                        stop_loss_price, take_profit_price, stop_loss_alert, take_profit_alert,
                        status, order_result, is_deleted, parent_trade_id, note, theoretical_risk_reward_ratio
                    ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,0,?19,?20,?21)",
                    params![
                        parent.user_id,
                        parent.strategy_id,
                        parent.instrument_code,
                        parent.instrument_name,
                        side_to_str(parent.side),
                        close_shares,
                        parent.open_time.to_rfc3339(),
                        parent.open_price,
                        input.close_time.to_rfc3339(),
                        input.close_price,
                        child_commission_buy,
                        input.commission_sell,
                        parent.stop_loss_price,
                        parent.take_profit_price,
                        parent.stop_loss_alert as i64,
                        parent.take_profit_alert as i64,
                        status_to_str(TradeStatus::Closed),
                        order_result_to_str(order_result),
                        trade_id,
                        parent.note,
                        parent.theoretical_risk_reward_ratio,
                    ],
                )?;
                let child_id = tx.last_insert_rowid();
                let sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1");
                tx.query_row(&sql, params![child_id], row_to_trade)?
            };

            self.recompute_locked(&tx, strategy_id)?;
            tx.commit()?;
            Ok(result_trade)
        })
        .await
    }

    pub async fn clear_all_trades(&self, user_id: i64, strategy_id: i64) -> Result<usize> {
        self.with_strategy_lock(user_id, strategy_id, move |conn| {
            let tx = conn.transaction()?;
            reads::fetch_owned_strategy(&tx, user_id, strategy_id)?;
            let deleted = tx.execute(
                "UPDATE trades SET is_deleted = 1 WHERE strategy_id = ?1 AND is_deleted = 0",
                params![strategy_id],
            )?;
            self.recompute_locked(&tx, strategy_id)?;
            tx.commit()?;
            Ok(deleted)
        })
        .await
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub fn capital_today(&self, user_id: i64, strategy_id: i64) -> Result<CapitalHistoryPoint> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        reads::fetch_owned_strategy(&conn, user_id, strategy_id)?;
        let today = self.today();
        let mut points = reads::fetch_capital_history(&conn, strategy_id, today, today)?;
        Ok(points.pop().unwrap_or(CapitalHistoryPoint {
            strategy_id,
            date: today,
            total_assets: 0.0,
            available_funds: 0.0,
            position_value: 0.0,
        }))
    }

    pub fn capital_history(
        &self,
        user_id: i64,
        strategy_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CapitalHistoryPoint>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        reads::fetch_owned_strategy(&conn, user_id, strategy_id)?;
        reads::fetch_capital_history(&conn, strategy_id, start, end)
    }

    pub fn positions(&self, user_id: i64, strategy_id: i64) -> Result<Vec<PositionView>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        reads::fetch_owned_strategy(&conn, user_id, strategy_id)?;
        let trades = reads::fetch_trades(&conn, strategy_id)?;
        Ok(compute_positions(&trades))
    }

    pub fn list_trades(
        &self,
        user_id: i64,
        strategy_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<TradeEvent>, usize)> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        reads::fetch_owned_strategy(&conn, user_id, strategy_id)?;
        let mut all = reads::fetch_trades(&conn, strategy_id)?;
        all.sort_by_key(|t| std::cmp::Reverse(t.open_time));
        let total = all.len();
        let page_size = page_size.max(1) as usize;
        let start = (page.saturating_sub(1) as usize) * page_size;
        let page_items = all.into_iter().skip(start).take(page_size).collect();
        Ok((page_items, total))
    }

    pub fn trades_on_date(&self, user_id: i64, strategy_id: i64, date: NaiveDate) -> Result<Vec<TradeEvent>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        reads::fetch_owned_strategy(&conn, user_id, strategy_id)?;
        let trades = reads::fetch_trades(&conn, strategy_id)?;
        Ok(trades
            .into_iter()
            .filter(|t| t.open_time.with_timezone(&self.tz).date_naive() == date)
            .collect())
    }

    pub fn trade_dates(&self, user_id: i64, strategy_id: i64) -> Result<Vec<NaiveDate>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        reads::fetch_owned_strategy(&conn, user_id, strategy_id)?;
        let trades = reads::fetch_trades(&conn, strategy_id)?;
        let mut dates: Vec<NaiveDate> = trades
            .iter()
            .map(|t| t.open_time.with_timezone(&self.tz).date_naive())
            .collect();
        dates.sort();
        dates.dedup();
        Ok(dates)
    }

    pub fn stock_codes(&self, user_id: i64, strategy_id: i64) -> Result<Vec<(String, Option<String>)>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        reads::fetch_owned_strategy(&conn, user_id, strategy_id)?;
        let trades = reads::fetch_trades(&conn, strategy_id)?;
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for t in trades {
            if seen.insert(t.instrument_code.clone()) {
                out.push((t.instrument_code, t.instrument_name));
            }
        }
        Ok(out)
    }

    /// Trades for one instrument plus summary statistics, per
    /// `GET /api/trades/stock/{code}`. `total_profit_loss` and the average
    /// ratio are computed over closed trades of that code only.
    pub fn trades_for_code(
        &self,
        user_id: i64,
        strategy_id: i64,
        code: &str,
    ) -> Result<(Vec<TradeEvent>, TradeStatistics)> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        reads::fetch_owned_strategy(&conn, user_id, strategy_id)?;
        let all: Vec<TradeEvent> = reads::fetch_trades(&conn, strategy_id)?
            .into_iter()
            .filter(|t| t.instrument_code == code)
            .collect();

        let closed: Vec<&TradeEvent> = all.iter().filter(|t| t.status == TradeStatus::Closed).collect();
        let total_profit_loss: f64 = closed
            .iter()
            .map(|t| {
                let proceeds = t.close_price.unwrap_or(0.0) * t.shares - t.commission_sell;
                let cost = t.open_price * t.shares + t.commission_buy;
                proceeds - cost
            })
            .sum();
        let ratios: Vec<f64> = all.iter().filter_map(|t| t.theoretical_risk_reward_ratio).collect();
        let average_theoretical_risk_reward_ratio = if ratios.is_empty() {
            None
        } else {
            Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
        };

        let stats = TradeStatistics {
            total_profit_loss,
            average_theoretical_risk_reward_ratio,
            trade_count: all.len(),
        };
        Ok((all, stats))
    }

    /// Every open position across every user — the feed for C4's monitor
    /// tick (spec.md §4.4 step 1). Read-only; never takes the strategy lock.
    pub fn all_open_positions(&self) -> Result<Vec<(i64, i64, PositionView)>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = conn.prepare("SELECT DISTINCT strategy_id, user_id FROM trades WHERE is_deleted = 0")?;
        let groups: Vec<(i64, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        let mut out = Vec::new();
        for (strategy_id, user_id) in groups {
            let trades = reads::fetch_trades(&conn, strategy_id)?;
            for position in compute_positions(&trades) {
                out.push((user_id, strategy_id, position));
            }
        }
        Ok(out)
    }

    // ---------------------------------------------------------------
    // Alert delivery records (spec.md §3, consulted by the notifier's
    // rate limiter — spec.md §4.5 step 2). Not strategy-scoped, so these
    // never take the per-strategy lock.
    // ---------------------------------------------------------------

    pub fn last_alert_sent(
        &self,
        user_id: i64,
        code: &str,
        direction: AlertDirection,
    ) -> Result<Option<chrono::DateTime<Utc>>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let raw: Option<String> = conn
            .query_row(
                "SELECT last_sent_at FROM alert_delivery WHERE user_id = ?1 AND instrument_code = ?2 AND direction = ?3",
                params![user_id, code, direction.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| crate::model::parse_datetime(&s)).transpose()
    }

    pub fn record_alert_sent(
        &self,
        user_id: i64,
        code: &str,
        direction: AlertDirection,
        at: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute(
            "INSERT INTO alert_delivery (user_id, instrument_code, direction, last_sent_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, instrument_code, direction) DO UPDATE SET last_sent_at = excluded.last_sent_at",
            params![user_id, code, direction.to_string(), at.to_rfc3339()],
        )?;
        Ok(())
    }
}

/// `(take_profit - open) / (open - stop_loss)`, present only when both
/// stop prices are set — spec.md §4.3.1 `create_trade`.
fn theoretical_ratio(open_price: f64, stop_loss: Option<f64>, take_profit: Option<f64>) -> Option<f64> {
    match (stop_loss, take_profit) {
        (Some(sl), Some(tp)) if (open_price - sl).abs() > f64::EPSILON => Some((tp - open_price) / (open_price - sl)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct TradeStatistics {
    pub total_profit_loss: f64,
    pub average_theoretical_risk_reward_ratio: Option<f64>,
    pub trade_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared_models::{AlertDirection, Side};

    const TZ: Tz = chrono_tz::Asia::Shanghai;

    fn store() -> Store {
        Store::new(Connection::open_in_memory().unwrap(), TZ).unwrap()
    }

    fn dt(y: i32, m: u32, d: u32, h: u32) -> chrono::DateTime<Utc> {
        TZ.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().with_timezone(&Utc)
    }

    fn paid_billing() -> BillingContext {
        BillingContext {
            billing_enabled: false,
            is_paid: false,
        }
    }

    #[tokio::test]
    async fn s2_canonical_example_end_to_end() {
        let store = store();
        let strategy = store.create_strategy(1, "main", Market::Stock).await.unwrap();
        store
            .set_anchor(
                1,
                strategy.id,
                SetAnchorInput {
                    amount: 100.0,
                    date: Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
                },
            )
            .await
            .unwrap();

        let trade = store
            .create_trade(
                1,
                strategy.id,
                CreateTradeInput {
                    instrument_code: "600000".into(),
                    side: Side::Buy,
                    shares: Some(1.0),
                    open_time: dt(2026, 1, 1, 9),
                    open_price: 2.0,
                    close_time: Some(dt(2026, 1, 1, 15)),
                    close_price: Some(5.0),
                    commission_buy: 5.0,
                    commission_sell: 5.0,
                    ..Default::default()
                },
                paid_billing(),
            )
            .await
            .unwrap();
        assert_eq!(trade.status, TradeStatus::Closed);

        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let history = store.capital_history(1, strategy.id, today, today).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].available_funds, 93.0);
        assert_eq!(history[0].total_assets, 93.0);
    }

    #[tokio::test]
    async fn billing_gate_blocks_trade_creation_when_unpaid() {
        let store = store();
        let strategy = store.create_strategy(1, "main", Market::Stock).await.unwrap();
        let result = store
            .create_trade(
                1,
                strategy.id,
                CreateTradeInput {
                    instrument_code: "600000".into(),
                    shares: Some(1.0),
                    open_time: dt(2026, 1, 1, 9),
                    open_price: 2.0,
                    ..Default::default()
                },
                BillingContext {
                    billing_enabled: true,
                    is_paid: false,
                },
            )
            .await;
        assert!(matches!(result, Err(Error::BillingRequired)));
    }

    #[tokio::test]
    async fn s7_risk_sizing_computes_shares() {
        let store = store();
        let strategy = store.create_strategy(1, "main", Market::Stock).await.unwrap();
        store
            .set_anchor(1, strategy.id, SetAnchorInput { amount: 100_000.0, date: None })
            .await
            .unwrap();

        let trade = store
            .create_trade(
                1,
                strategy.id,
                CreateTradeInput {
                    instrument_code: "600000".into(),
                    open_time: dt(2026, 1, 1, 9),
                    open_price: 20.0,
                    stop_loss_price: Some(19.0),
                    risk_per_trade: Some(500.0),
                    ..Default::default()
                },
                paid_billing(),
            )
            .await
            .unwrap();
        assert_eq!(trade.shares, 500.0);
    }

    #[tokio::test]
    async fn partial_close_prorates_buy_commission() {
        let store = store();
        let strategy = store.create_strategy(1, "main", Market::Stock).await.unwrap();
        store
            .set_anchor(
                1,
                strategy.id,
                SetAnchorInput {
                    amount: 10_000.0,
                    date: Some(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()),
                },
            )
            .await
            .unwrap();

        let trade = store
            .create_trade(
                1,
                strategy.id,
                CreateTradeInput {
                    instrument_code: "600000".into(),
                    shares: Some(1000.0),
                    open_time: dt(2026, 2, 1, 9),
                    open_price: 10.0,
                    commission_buy: 10.0,
                    ..Default::default()
                },
                paid_billing(),
            )
            .await
            .unwrap();

        let child = store
            .close_position(
                1,
                strategy.id,
                trade.id,
                ClosePositionInput {
                    close_price: 12.0,
                    close_time: dt(2026, 2, 2, 10),
                    shares: Some(300.0),
                    commission_sell: 0.0,
                    direction: AlertDirection::TakeProfit,
                },
            )
            .await
            .unwrap();

        // child gets 300/1000 of the 10.0 buy commission, parent keeps the rest
        assert_eq!(child.commission_buy, 3.0);

        let positions = store.positions(1, strategy.id).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].remaining_shares, 700.0);
        assert_eq!(positions[0].closed_shares, 300.0);

        let day2 = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        let history = store.capital_history(1, strategy.id, day2, day2).unwrap();
        assert_eq!(history[0].position_value, 7_000.0);
    }

    #[tokio::test]
    async fn delete_trade_restores_pre_creation_history() {
        let store = store();
        let strategy = store.create_strategy(1, "main", Market::Stock).await.unwrap();
        store
            .set_anchor(
                1,
                strategy.id,
                SetAnchorInput {
                    amount: 100_000.0,
                    date: Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
                },
            )
            .await
            .unwrap();

        let trade = store
            .create_trade(
                1,
                strategy.id,
                CreateTradeInput {
                    instrument_code: "600000".into(),
                    shares: Some(100.0),
                    open_time: dt(2026, 1, 1, 9),
                    open_price: 20.0,
                    close_time: Some(dt(2026, 1, 2, 10)),
                    close_price: Some(22.0),
                    ..Default::default()
                },
                paid_billing(),
            )
            .await
            .unwrap();

        store.delete_trade(1, strategy.id, trade.id).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let history = store.capital_history(1, strategy.id, day, day).unwrap();
        assert_eq!(history[0].total_assets, 100_000.0);
        assert_eq!(history[0].available_funds, 100_000.0);
        assert_eq!(history[0].position_value, 0.0);
    }

    #[tokio::test]
    async fn cross_user_access_is_not_found() {
        let store = store();
        let strategy = store.create_strategy(1, "main", Market::Stock).await.unwrap();
        let result = store.positions(2, strategy.id);
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn delete_strategy_clears_history_and_anchor() {
        let store = store();
        let strategy = store.create_strategy(1, "main", Market::Stock).await.unwrap();
        store
            .set_anchor(1, strategy.id, SetAnchorInput { amount: 1_000.0, date: None })
            .await
            .unwrap();
        store.delete_strategy(1, strategy.id).await.unwrap();
        assert!(matches!(store.positions(1, strategy.id), Err(Error::NotFound)));
    }
}
