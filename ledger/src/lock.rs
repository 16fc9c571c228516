// ledger/src/lock.rs
//! Per-`(user_id, strategy_id)` exclusive lock, per spec.md §5: every
//! mutation serializes on the strategy it touches; distinct strategies
//! proceed fully in parallel; read paths never take this lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub(crate) struct StrategyLocks {
    locks: StdMutex<HashMap<(i64, i64), Arc<Mutex<()>>>>,
}

impl StrategyLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn acquire(&self, user_id: i64, strategy_id: i64) -> OwnedMutexGuard<()> {
        let handle = self
            .locks
            .lock()
            .unwrap()
            .entry((user_id, strategy_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        handle.lock_owned().await
    }
}
