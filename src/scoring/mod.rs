//! Scoring Games
//! Mission: The four pool games plus the pure engine that merges them

pub mod bonus_table;
pub mod bracket;
pub mod engine;
pub mod ranking;
pub mod round_robin;
pub mod top_bottom;

pub use engine::{compute_round, RoundComputation};
pub use ranking::{rank_round, RankedScore};
