// ledger/src/recompute.rs
//! The core contract (spec.md §4.3.2): turn an ordered trade-event log plus
//! a capital anchor into the full daily `(available_funds, position_value,
//! total_assets)` series for one strategy. Pure and deterministic — no I/O,
//! so it is exhaustively unit tested without a database.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use shared_models::{CapitalAnchor, CapitalHistoryPoint, TradeEvent, TradeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Open,
    Close,
}

#[derive(Debug, Clone, Copy)]
struct LedgerEvent {
    time: DateTime<Utc>,
    kind: EventKind,
    trade_id: i64,
    amount: f64,
    /// `open_price * shares` of the trade this event belongs to — the book
    /// value contributed to `position_value` while the lot is open.
    book_value: f64,
}

fn start_of_day_utc(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    tz.from_local_datetime(&date.and_hms_opt(0, 0, 0).expect("valid midnight"))
        .single()
        .expect("unambiguous local midnight")
        .with_timezone(&Utc)
}

fn reporting_date(tz: Tz, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Builds the two logical events (`OPEN`, and `CLOSE` if closed) for one
/// trade row, per spec.md §4.3.2 step 1. The parent/child split is
/// transparent here: both kinds of rows carry their own `shares` /
/// `commission_buy` / `commission_sell`, already adjusted by the mutation
/// layer, so the same construction applies uniformly.
fn events_for_trade(trade: &TradeEvent, anchor_start: DateTime<Utc>) -> Vec<LedgerEvent> {
    let mut events = Vec::with_capacity(2);

    let open_time = trade.open_time.max(anchor_start);
    let book_value = trade.open_price * trade.shares;
    events.push(LedgerEvent {
        time: open_time,
        kind: EventKind::Open,
        trade_id: trade.id,
        amount: trade.open_price * trade.shares + trade.commission_buy,
        book_value,
    });

    if trade.status == TradeStatus::Closed {
        if let (Some(close_time), Some(close_price)) = (trade.close_time, trade.close_price) {
            events.push(LedgerEvent {
                time: close_time,
                kind: EventKind::Close,
                trade_id: trade.id,
                amount: close_price * trade.shares - trade.commission_sell,
                book_value,
            });
        }
    }

    events
}

fn sort_events(events: &mut [LedgerEvent]) {
    events.sort_by(|a, b| {
        a.time.cmp(&b.time).then_with(|| {
            let kind_rank = |k: EventKind| match k {
                EventKind::Open => 0,
                EventKind::Close => 1,
            };
            kind_rank(a.kind)
                .cmp(&kind_rank(b.kind))
                .then_with(|| a.trade_id.cmp(&b.trade_id))
        })
    });
}

/// Recomputes the full daily capital history for one strategy.
///
/// `trades` must already be filtered to non-deleted rows of the strategy.
/// `today` is the reporting-timezone calendar date recompute is being run
/// on — callers pass the live date; tests pin it for determinism.
pub fn compute_history(
    trades: &[TradeEvent],
    anchor: Option<CapitalAnchor>,
    today: NaiveDate,
    tz: Tz,
) -> Vec<CapitalHistoryPoint> {
    let Some(anchor) = anchor else {
        return Vec::new();
    };

    let anchor_start = start_of_day_utc(tz, anchor.date);

    let mut events: Vec<LedgerEvent> = trades
        .iter()
        .flat_map(|t| events_for_trade(t, anchor_start))
        .collect();
    sort_events(&mut events);

    let last_event_date = events
        .iter()
        .map(|e| reporting_date(tz, e.time))
        .max()
        .unwrap_or(anchor.date);
    let last_date = today.max(last_event_date).max(anchor.date);

    let mut available_funds = anchor.amount;
    let mut open_lots: HashMap<i64, f64> = HashMap::new();
    let mut cursor = 0usize;
    let mut points = Vec::new();

    let mut date = anchor.date;
    loop {
        // Apply every event whose effective reporting-date is <= `date`.
        while cursor < events.len() && reporting_date(tz, events[cursor].time) <= date {
            let event = events[cursor];
            match event.kind {
                EventKind::Open => {
                    available_funds -= event.amount;
                    open_lots.insert(event.trade_id, event.book_value);
                }
                EventKind::Close => {
                    available_funds += event.amount;
                    open_lots.remove(&event.trade_id);
                }
            }
            cursor += 1;
        }

        let position_value: f64 = open_lots.values().sum();
        points.push(CapitalHistoryPoint {
            strategy_id: trades.first().map(|t| t.strategy_id).unwrap_or_default(),
            date,
            total_assets: available_funds + position_value,
            available_funds,
            position_value,
        });

        if date >= last_date {
            break;
        }
        date = date.succ_opt().expect("calendar date does not overflow");
    }

    points
}

/// Ties strategy_id onto every point when the trade list was empty (the
/// no-trades case above can't read it off `trades[0]`).
pub fn with_strategy_id(mut points: Vec<CapitalHistoryPoint>, strategy_id: i64) -> Vec<CapitalHistoryPoint> {
    for p in &mut points {
        p.strategy_id = strategy_id;
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use shared_models::{OrderResult, Side, TradeStatus};

    const TZ: Tz = chrono_tz::Asia::Shanghai;

    fn dt(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        TZ.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().with_timezone(&Utc)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn base_trade(id: i64, strategy_id: i64) -> TradeEvent {
        TradeEvent {
            id,
            user_id: 1,
            strategy_id,
            instrument_code: "600000".into(),
            instrument_name: None,
            side: Side::Buy,
            shares: 0.0,
            open_time: dt(2026, 1, 1, 9),
            open_price: 0.0,
            close_time: None,
            close_price: None,
            commission_buy: 0.0,
            commission_sell: 0.0,
            stop_loss_price: None,
            take_profit_price: None,
            stop_loss_alert: false,
            take_profit_alert: false,
            status: TradeStatus::Open,
            order_result: None,
            is_deleted: false,
            parent_trade_id: None,
            note: None,
            theoretical_risk_reward_ratio: None,
        }
    }

    #[test]
    fn s1_flat_history_with_no_trades() {
        let anchor = CapitalAnchor {
            strategy_id: 1,
            amount: 100_000.0,
            date: date(2026, 1, 1),
        };
        let points = compute_history(&[], Some(anchor), date(2026, 1, 5), TZ);
        assert_eq!(points.len(), 5);
        for p in &points {
            assert_eq!(p.available_funds, 100_000.0);
            assert_eq!(p.position_value, 0.0);
            assert_eq!(p.total_assets, 100_000.0);
        }
    }

    #[test]
    fn s2_canonical_example() {
        let anchor = CapitalAnchor {
            strategy_id: 1,
            amount: 100.0,
            date: date(2026, 1, 1),
        };
        let mut trade = base_trade(1, 1);
        trade.shares = 1.0;
        trade.open_price = 2.0;
        trade.commission_buy = 5.0;
        trade.open_time = dt(2026, 1, 1, 9);
        trade.close_time = Some(dt(2026, 1, 1, 15));
        trade.close_price = Some(5.0);
        trade.commission_sell = 5.0;
        trade.status = TradeStatus::Closed;
        trade.order_result = Some(OrderResult::Manual);

        let points = compute_history(&[trade], Some(anchor), date(2026, 1, 1), TZ);
        assert_eq!(points.len(), 1);
        let p = points[0];
        // available: 100 - (2*1+5) + (5*1-5) = 100 - 7 + 0 = 93
        assert_eq!(p.available_funds, 93.0);
        assert_eq!(p.position_value, 0.0);
        assert_eq!(p.total_assets, 93.0);
    }

    #[test]
    fn s3_profit_over_multiple_days() {
        let anchor = CapitalAnchor {
            strategy_id: 1,
            amount: 100_000.0,
            date: date(2026, 1, 1),
        };
        let mut trade = base_trade(1, 1);
        trade.shares = 1000.0;
        trade.open_price = 15.0;
        trade.open_time = dt(2026, 1, 1, 9);
        trade.close_time = Some(dt(2026, 1, 3, 15));
        trade.close_price = Some(18.0);
        trade.status = TradeStatus::Closed;
        trade.order_result = Some(OrderResult::Manual);

        let points = compute_history(&[trade], Some(anchor), date(2026, 1, 3), TZ);
        let day3 = points.last().unwrap();
        assert_eq!(day3.available_funds, 103_000.0);
        assert_eq!(day3.position_value, 0.0);
        assert_eq!(day3.total_assets, 103_000.0);

        // Day 2 (still open): funds drained, position booked at entry price.
        let day2 = points[1];
        assert_eq!(day2.available_funds, 100_000.0 - 15_000.0);
        assert_eq!(day2.position_value, 15_000.0);
    }

    #[test]
    fn s4_partial_close() {
        let anchor = CapitalAnchor {
            strategy_id: 1,
            amount: 10_000.0,
            date: date(2026, 2, 1),
        };
        // Parent now holds the remaining 700 shares (partial close already applied).
        let mut parent = base_trade(1, 1);
        parent.shares = 700.0;
        parent.open_price = 10.0;
        parent.open_time = dt(2026, 2, 1, 9);
        parent.status = TradeStatus::Open;

        let mut child = base_trade(2, 1);
        child.parent_trade_id = Some(1);
        child.shares = 300.0;
        child.open_price = 10.0;
        child.open_time = dt(2026, 2, 1, 9);
        child.close_time = Some(dt(2026, 2, 2, 10));
        child.close_price = Some(12.0);
        child.status = TradeStatus::Closed;
        child.order_result = Some(OrderResult::TakeProfit);

        let points = compute_history(&[parent, child], Some(anchor), date(2026, 2, 2), TZ);
        let day2 = points.last().unwrap();
        // available: 10000 - (700*10) - (300*10) + (300*12) = 10000 - 10000 + 3600 = 3600
        assert_eq!(day2.available_funds, 3_600.0);
        assert_eq!(day2.position_value, 7_000.0);
        assert_eq!(day2.total_assets, 10_600.0);
    }

    #[test]
    fn s5_delete_undoes_history() {
        let anchor = CapitalAnchor {
            strategy_id: 1,
            amount: 100_000.0,
            date: date(2026, 1, 1),
        };
        let points = compute_history(&[], Some(anchor), date(2026, 1, 1), TZ);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].total_assets, 100_000.0);
        assert_eq!(points[0].available_funds, 100_000.0);
        assert_eq!(points[0].position_value, 0.0);
    }

    #[test]
    fn open_before_anchor_is_clamped() {
        let anchor = CapitalAnchor {
            strategy_id: 1,
            amount: 1_000.0,
            date: date(2026, 3, 1),
        };
        let mut trade = base_trade(1, 1);
        trade.shares = 10.0;
        trade.open_price = 10.0;
        trade.open_time = dt(2026, 2, 1, 9); // before the anchor date
        trade.status = TradeStatus::Open;

        let points = compute_history(&[trade], Some(anchor), date(2026, 3, 1), TZ);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].available_funds, 900.0);
        assert_eq!(points[0].position_value, 100.0);
    }

    #[test]
    fn recompute_is_idempotent() {
        let anchor = CapitalAnchor {
            strategy_id: 1,
            amount: 50_000.0,
            date: date(2026, 1, 1),
        };
        let mut trade = base_trade(1, 1);
        trade.shares = 100.0;
        trade.open_price = 20.0;
        trade.close_time = Some(dt(2026, 1, 2, 10));
        trade.close_price = Some(22.0);
        trade.status = TradeStatus::Closed;
        trade.order_result = Some(OrderResult::Manual);

        let first = compute_history(&[trade.clone()], Some(anchor), date(2026, 1, 2), TZ);
        let second = compute_history(&[trade], Some(anchor), date(2026, 1, 2), TZ);
        assert_eq!(first, second);
    }
}
