// notifier/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("ledger error: {0}")]
    Ledger(#[from] ledger::Error),

    #[error("mail transport error: {0}")]
    Mail(String),
}
