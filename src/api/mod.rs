//! API Module
//! Mission: HTTP surface for ledgers, consolidation and administration

pub mod routes;
pub mod tenant;

pub use routes::{create_router, AppState};
pub use tenant::TenantScope;
