// monitor/src/lib.rs
//! C4 — Position/Alert Monitor. A single long-lived loop with a fixed tick
//! (spec.md §4.4): enumerate every open position across every user, batch
//! a fresh quote for the distinct instrument codes, evaluate the
//! stop-loss/take-profit predicates through a per-position latch, and push
//! the resulting `AlertEvent`s onto C5's inbox.
//!
//! The loop never touches C3's per-strategy mutation lock — it only calls
//! `ledger::Store`'s read-only `all_open_positions`, matching spec.md §5's
//! "C4 never holds the C3 mutation lock".

mod latch;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ledger::Store;
use price_cache::PriceCache;
use shared_models::{AlertDirection, AlertEvent, PositionView};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

pub use latch::Latches;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);

pub struct Monitor {
    store: Arc<Store>,
    cache: Arc<PriceCache>,
    outbox: mpsc::Sender<AlertEvent>,
    latches: Latches,
    tick_interval: Duration,
}

impl Monitor {
    pub fn new(store: Arc<Store>, cache: Arc<PriceCache>, outbox: mpsc::Sender<AlertEvent>) -> Self {
        Self::with_tick_interval(store, cache, outbox, DEFAULT_TICK_INTERVAL)
    }

    pub fn with_tick_interval(
        store: Arc<Store>,
        cache: Arc<PriceCache>,
        outbox: mpsc::Sender<AlertEvent>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            outbox,
            latches: Latches::new(),
            tick_interval,
        }
    }

    /// Runs until `shutdown` resolves. Any tick already in flight is
    /// allowed to finish; no partial alert state is persisted mid-tick
    /// (spec.md §4.4 cancellation).
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = self.tick_interval.as_secs(), "starting position/alert monitor");
        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!(%err, "monitor tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("monitor received shutdown signal, exiting");
                        return;
                    }
                }
            }
        }
    }

    #[instrument(skip_all)]
    async fn tick(&self) -> Result<(), ledger::Error> {
        let positions = self.store.all_open_positions()?;
        if positions.is_empty() {
            debug!("no open positions to monitor");
            return Ok(());
        }

        let codes: Vec<String> = positions
            .iter()
            .map(|(_, _, p)| p.instrument_code.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let quotes = self.cache.batch(&codes, true).await;
        // A quote tagged "unavailable" carries no real price (spec.md §7
        // dependency-failure policy) — skip it rather than evaluate
        // alerts against a zero sentinel.
        let prices: HashMap<&str, f64> = quotes
            .iter()
            .filter(|q| q.source != "unavailable")
            .map(|q| (q.code.as_str(), q.price))
            .collect();

        let open_trade_ids: HashSet<i64> = positions.iter().map(|(_, _, p)| p.trade_id).collect();
        self.latches.retain_only(&open_trade_ids);

        for (user_id, strategy_id, position) in &positions {
            let Some(&price) = prices.get(position.instrument_code.as_str()) else {
                continue;
            };
            self.evaluate(*user_id, *strategy_id, position, price).await;
        }
        Ok(())
    }

    async fn evaluate(&self, user_id: i64, strategy_id: i64, position: &PositionView, price: f64) {
        if let Some(stop_loss) = position.stop_loss_price.filter(|_| position.stop_loss_alert) {
            let met = price <= stop_loss;
            if self.latches.should_fire(position.trade_id, AlertDirection::StopLoss, met) {
                self.emit(user_id, strategy_id, position, AlertDirection::StopLoss, price, stop_loss)
                    .await;
            }
        }
        if let Some(take_profit) = position.take_profit_price.filter(|_| position.take_profit_alert) {
            let met = price >= take_profit;
            if self.latches.should_fire(position.trade_id, AlertDirection::TakeProfit, met) {
                self.emit(user_id, strategy_id, position, AlertDirection::TakeProfit, price, take_profit)
                    .await;
            }
        }
    }

    async fn emit(
        &self,
        user_id: i64,
        strategy_id: i64,
        position: &PositionView,
        direction: AlertDirection,
        price: f64,
        target: f64,
    ) {
        let event = AlertEvent {
            user_id,
            strategy_id,
            trade_id: position.trade_id,
            instrument_code: position.instrument_code.clone(),
            instrument_name: position.instrument_name.clone(),
            direction,
            price,
            target,
            occurred_at: Utc::now(),
        };
        info!(
            trade_id = position.trade_id,
            code = %position.instrument_code,
            %direction,
            price,
            target,
            "alert condition crossed"
        );
        // Backpressure only: a full inbox means C5 is behind, never a
        // reason to block the tick indefinitely (spec.md §5).
        if self.outbox.send(event).await.is_err() {
            warn!("notifier inbox closed, dropping alert event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono_tz::Asia::Shanghai;
    use ledger::{BillingContext, CreateTradeInput};
    use quote_source::{Error as QuoteError, QuoteProvider, QuoteSource, RawQuote};
    use rusqlite::Connection;
    use shared_models::{AlertDirection, Market, Side};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedPrice(Arc<std::sync::Mutex<f64>>);

    #[async_trait]
    impl QuoteProvider for FixedPrice {
        fn tag(&self) -> &str {
            "fixed"
        }
        async fn fetch_one(&self, _code: &str) -> Result<RawQuote, QuoteError> {
            Ok(RawQuote {
                price: *self.0.lock().unwrap(),
                source: "fixed".to_string(),
            })
        }
    }

    fn billing() -> BillingContext {
        BillingContext {
            billing_enabled: false,
            is_paid: false,
        }
    }

    async fn store_with_open_position(price_target: (f64, f64)) -> (Arc<Store>, i64, i64) {
        let store = Arc::new(Store::new(Connection::open_in_memory().unwrap(), Shanghai).unwrap());
        let strategy = store.create_strategy(1, "s", Market::Stock).await.unwrap();
        let trade = store
            .create_trade(
                1,
                strategy.id,
                CreateTradeInput {
                    instrument_code: "600000".into(),
                    side: Side::Buy,
                    shares: Some(100.0),
                    open_price: 10.0,
                    stop_loss_price: Some(price_target.0),
                    take_profit_price: Some(price_target.1),
                    stop_loss_alert: true,
                    take_profit_alert: true,
                    ..Default::default()
                },
                billing(),
            )
            .await
            .unwrap();
        (store, strategy.id, trade.id)
    }

    #[tokio::test]
    async fn tick_emits_exactly_two_stop_loss_alerts_across_the_s6_sequence() {
        let (store, _strategy_id, _trade_id) = store_with_open_position((10.00, 999.0)).await;
        let price = Arc::new(std::sync::Mutex::new(0.0));
        let source = QuoteSource::new(vec![Box::new(FixedPrice(price.clone()))]);
        let cache = Arc::new(PriceCache::new(source));
        let (tx, mut rx) = mpsc::channel(16);
        let monitor = Monitor::new(store, cache, tx);

        let mut fired = 0;
        for p in [10.5, 10.1, 9.9, 9.8, 10.2, 9.7] {
            *price.lock().unwrap() = p;
            monitor.tick().await.unwrap();
            while rx.try_recv().is_ok() {
                fired += 1;
            }
        }
        assert_eq!(fired, 2);
    }

    #[tokio::test]
    async fn take_profit_breach_emits_a_distinct_direction() {
        let (store, _strategy_id, _trade_id) = store_with_open_position((0.0, 15.0)).await;
        let price = Arc::new(std::sync::Mutex::new(16.0));
        let source = QuoteSource::new(vec![Box::new(FixedPrice(price))]);
        let cache = Arc::new(PriceCache::new(source));
        let (tx, mut rx) = mpsc::channel(16);
        let monitor = Monitor::new(store, cache, tx);

        monitor.tick().await.unwrap();
        let event = rx.try_recv().expect("expected one alert event");
        assert_eq!(event.direction, AlertDirection::TakeProfit);
        assert_eq!(event.target, 15.0);
    }

    #[tokio::test]
    async fn quote_unavailable_for_code_skips_evaluation_without_error() {
        struct AlwaysFails;
        #[async_trait]
        impl QuoteProvider for AlwaysFails {
            fn tag(&self) -> &str {
                "dead"
            }
            async fn fetch_one(&self, code: &str) -> Result<RawQuote, QuoteError> {
                Err(QuoteError::AllProvidersFailed { code: code.to_string() })
            }
        }
        let (store, _strategy_id, _trade_id) = store_with_open_position((10.0, 20.0)).await;
        let source = QuoteSource::new(vec![Box::new(AlwaysFails)]);
        let cache = Arc::new(PriceCache::new(source));
        let (tx, mut rx) = mpsc::channel(16);
        let monitor = Monitor::new(store, cache, tx);

        monitor.tick().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_store_ticks_without_touching_the_cache() {
        let store = Arc::new(Store::new(Connection::open_in_memory().unwrap(), Shanghai).unwrap());
        let calls = Arc::new(AtomicUsize::new(0));

        struct Counting(Arc<AtomicUsize>);
        #[async_trait]
        impl QuoteProvider for Counting {
            fn tag(&self) -> &str {
                "counting"
            }
            async fn fetch_one(&self, _code: &str) -> Result<RawQuote, QuoteError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(RawQuote { price: 1.0, source: "counting".into() })
            }
        }
        let source = QuoteSource::new(vec![Box::new(Counting(calls.clone()))]);
        let cache = Arc::new(PriceCache::new(source));
        let (tx, _rx) = mpsc::channel(16);
        let monitor = Monitor::new(store, cache, tx);

        monitor.tick().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
