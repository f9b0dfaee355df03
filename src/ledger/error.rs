//! Ledger Error Taxonomy
//! Mission: Variants callers can match on; anyhow stays at the edges

use crate::models::Round;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// A scored-round operation was attempted with the season marker (round
    /// 0) or vice versa.
    #[error("invalid round {0} for this operation")]
    InvalidRound(Round),

    /// The transaction kind is not allowed through this write path.
    #[error("transaction kind {0} is not allowed here")]
    KindNotAllowed(&'static str),

    /// The stored balance no longer equals the sum of the stored
    /// transactions. Fatal for this entry only; the write was rolled back
    /// and the prescribed recovery is an idempotent replay from round 1.
    #[error("ledger entry {key} failed the sum invariant: balance {balance} != sum {sum}")]
    InvariantViolation {
        key: String,
        balance: f64,
        sum: f64,
    },

    #[error("ledger storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
