//! PoolHouse Backend
//! Mission: Deterministic ledger consolidation for fantasy pool leagues

pub mod api;
pub mod auth;
pub mod config;
pub mod consolidator;
pub mod leagues;
pub mod ledger;
pub mod models;
pub mod scheduler;
pub mod scoring;
pub mod scrapers;
