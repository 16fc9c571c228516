// ledger/src/error.rs
use thiserror::Error;

/// Taxonomy per spec.md §7, scoped to what C3 itself can raise. The edge
/// maps each variant to an HTTP status.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("billing required")]
    BillingRequired,

    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Db(#[from] rusqlite::Error),
}
