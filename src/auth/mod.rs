//! Authentication Module
//! Mission: Secure API access with JWT tokens and per-tenant RBAC

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod user_store;

pub use jwt::JwtHandler;
pub use middleware::auth_middleware;
pub use user_store::UserStore;
