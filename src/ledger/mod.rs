//! Ledger
//! Mission: Durable, auditable money movement with one hard invariant:
//! a stored balance always equals the sum of its stored transactions

mod error;
mod season;
mod store;

pub use error::LedgerError;
pub use season::{SeasonError, SeasonTransitionProcessor, TransitionOutcome};
pub use store::{EntryKey, LedgerSnapshot, LedgerStore};
