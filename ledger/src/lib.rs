// ledger/src/lib.rs
//! C3 — Event Store & Ledger Recomputer. Owns `strategies`, `capital_anchors`,
//! `trades`, `capital_history` and `alert_delivery`. Every mutation runs
//! under the per-strategy lock in [`lock::StrategyLocks`] and recomputes the
//! strategy's capital history inside the same transaction (spec.md §4.3.4);
//! reads never take that lock.

mod error;
mod lock;
mod model;
mod positions;
mod reads;
mod recompute;
mod schema;
mod store;
mod types;

pub use error::Error;
pub use positions::compute_positions;
pub use recompute::{compute_history, with_strategy_id};
pub use store::{Store, TradeStatistics};
pub use types::{BillingContext, ClosePositionInput, CreateTradeInput, SetAnchorInput, UpdateTradePatch};

pub type Result<T> = std::result::Result<T, Error>;
