// monitor/src/latch.rs
//! Per-`(trade_id, direction)` hysteresis so a threshold crossing fires
//! exactly once per excursion (spec.md §4.4 step 3, invariant 7).
//!
//! Each key starts "armed". While armed, a condition-met observation fires
//! once and disarms the latch; the latch re-arms the next time the
//! condition is *not* met. This mirrors a level trigger with reset, not an
//! edge trigger — so the very first tick that already sees the condition
//! held fires immediately, matching S6's first `9.9` reading.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use shared_models::AlertDirection;

#[derive(Default)]
pub struct Latches {
    armed: StdMutex<HashMap<(i64, AlertDirection), bool>>,
}

impl Latches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` exactly when this observation should emit an alert.
    pub fn should_fire(&self, trade_id: i64, direction: AlertDirection, condition_met: bool) -> bool {
        let mut armed = self.armed.lock().expect("latch mutex poisoned");
        let key = (trade_id, direction);
        let is_armed = *armed.entry(key).or_insert(true);

        if condition_met {
            if is_armed {
                armed.insert(key, false);
                true
            } else {
                false
            }
        } else {
            armed.insert(key, true);
            false
        }
    }

    /// Drops latch state for a trade that is no longer an open position
    /// (closed or deleted), so a future trade reusing the id starts fresh.
    pub fn forget(&self, trade_id: i64) {
        let mut armed = self.armed.lock().expect("latch mutex poisoned");
        armed.retain(|(id, _), _| *id != trade_id);
    }

    /// Drops latch state for every trade id not in `open_trade_ids` —
    /// called once per tick so a closed position's latch does not linger.
    pub fn retain_only(&self, open_trade_ids: &std::collections::HashSet<i64>) {
        let mut armed = self.armed.lock().expect("latch mutex poisoned");
        armed.retain(|(id, _), _| open_trade_ids.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::AlertDirection::StopLoss;

    /// S6 — prices `10.5, 10.1, 9.9, 9.8, 10.2, 9.7` against `stop_loss = 10.00`.
    /// Exactly two alerts: the first `9.9`, and the final `9.7` (the `10.2`
    /// in between re-arms the latch).
    #[test]
    fn s6_alert_latch_scenario() {
        let latches = Latches::new();
        let stop_loss = 10.00;
        let prices = [10.5, 10.1, 9.9, 9.8, 10.2, 9.7];
        let fires: Vec<bool> = prices
            .iter()
            .map(|&p| latches.should_fire(1, StopLoss, p <= stop_loss))
            .collect();

        assert_eq!(fires, vec![false, false, true, false, false, true]);
        assert_eq!(fires.iter().filter(|&&f| f).count(), 2);
    }

    /// Invariant 7 — `below, below, above, below` fires exactly once, on the
    /// first `below`.
    #[test]
    fn invariant_7_fires_once_per_crossing() {
        let latches = Latches::new();
        let conditions = [true, true, false, true];
        let fires: Vec<bool> = conditions
            .iter()
            .map(|&met| latches.should_fire(42, StopLoss, met))
            .collect();
        assert_eq!(fires, vec![true, false, false, true]);
    }

    #[test]
    fn distinct_trades_and_directions_have_independent_latches() {
        let latches = Latches::new();
        assert!(latches.should_fire(1, StopLoss, true));
        assert!(latches.should_fire(2, StopLoss, true));
        assert!(latches.should_fire(1, AlertDirection::TakeProfit, true));
    }

    #[test]
    fn forget_clears_state_for_a_closed_trade() {
        let latches = Latches::new();
        assert!(latches.should_fire(1, StopLoss, true));
        assert!(!latches.should_fire(1, StopLoss, true));
        latches.forget(1);
        assert!(latches.should_fire(1, StopLoss, true));
    }
}
