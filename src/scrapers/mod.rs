//! Scoring Provider Clients
//! Mission: Everything that talks to the upstream scores API lives here

pub mod score_cache;
pub mod scoring_source;

pub use score_cache::ScoreCache;
pub use scoring_source::{HttpScoringSource, ScoringSource, SourceError};
