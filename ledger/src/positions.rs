// ledger/src/positions.rs
//! Position view derivation (spec.md §4.3.3). Pure function over the same
//! trade list `recompute` uses — no I/O, read-time only, never persisted.

use shared_models::{PartialClose, PositionView, TradeEvent, TradeStatus};

/// Derives the open-position view for one strategy from its non-deleted
/// trades: every still-open, non-child trade, with its partial-close
/// children attached in close-time order.
pub fn compute_positions(trades: &[TradeEvent]) -> Vec<PositionView> {
    let mut views = Vec::new();

    for trade in trades
        .iter()
        .filter(|t| !t.is_deleted && t.parent_trade_id.is_none() && t.status == TradeStatus::Open)
    {
        let mut children: Vec<&TradeEvent> = trades
            .iter()
            .filter(|t| !t.is_deleted && t.parent_trade_id == Some(trade.id))
            .collect();
        children.sort_by_key(|c| c.close_time);

        let closed_shares: f64 = children.iter().map(|c| c.shares).sum();
        let partial_closes: Vec<PartialClose> = children
            .iter()
            .filter_map(|c| {
                Some(PartialClose {
                    trade_id: c.id,
                    shares: c.shares,
                    close_time: c.close_time?,
                    close_price: c.close_price?,
                    order_result: c.order_result,
                })
            })
            .collect();

        views.push(PositionView {
            trade_id: trade.id,
            strategy_id: trade.strategy_id,
            instrument_code: trade.instrument_code.clone(),
            instrument_name: trade.instrument_name.clone(),
            side: trade.side,
            remaining_shares: trade.shares,
            avg_open_price: trade.open_price,
            opened_shares: trade.shares + closed_shares,
            closed_shares,
            partial_closes,
            stop_loss_price: trade.stop_loss_price,
            take_profit_price: trade.take_profit_price,
            stop_loss_alert: trade.stop_loss_alert,
            take_profit_alert: trade.take_profit_alert,
        });
    }

    views
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_models::{OrderResult, Side};

    fn trade(id: i64, parent: Option<i64>, shares: f64, status: TradeStatus) -> TradeEvent {
        TradeEvent {
            id,
            user_id: 1,
            strategy_id: 1,
            instrument_code: "600000".into(),
            instrument_name: None,
            side: Side::Buy,
            shares,
            open_time: Utc::now(),
            open_price: 10.0,
            close_time: if status == TradeStatus::Closed { Some(Utc::now()) } else { None },
            close_price: if status == TradeStatus::Closed { Some(12.0) } else { None },
            commission_buy: 0.0,
            commission_sell: 0.0,
            stop_loss_price: None,
            take_profit_price: None,
            stop_loss_alert: false,
            take_profit_alert: false,
            status,
            order_result: if status == TradeStatus::Closed { Some(OrderResult::Manual) } else { None },
            is_deleted: false,
            parent_trade_id: parent,
            note: None,
            theoretical_risk_reward_ratio: None,
        }
    }

    #[test]
    fn open_parent_with_one_partial_close() {
        let parent = trade(1, None, 700.0, TradeStatus::Open);
        let child = trade(2, Some(1), 300.0, TradeStatus::Closed);
        let views = compute_positions(&[parent, child]);
        assert_eq!(views.len(), 1);
        let v = &views[0];
        assert_eq!(v.remaining_shares, 700.0);
        assert_eq!(v.closed_shares, 300.0);
        assert_eq!(v.opened_shares, 1000.0);
        assert_eq!(v.partial_closes.len(), 1);
    }

    #[test]
    fn fully_closed_trade_is_not_a_position() {
        let closed = trade(1, None, 100.0, TradeStatus::Closed);
        assert!(compute_positions(&[closed]).is_empty());
    }

    #[test]
    fn child_rows_never_surface_as_their_own_position() {
        let parent = trade(1, None, 50.0, TradeStatus::Open);
        let child = trade(2, Some(1), 50.0, TradeStatus::Closed);
        let views = compute_positions(&[parent, child]);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].trade_id, 1);
    }
}
