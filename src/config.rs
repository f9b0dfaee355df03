//! Runtime Configuration
//! Mission: All knobs come from the environment, with sane defaults

use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database path (ledger, leagues, users and scheduler state).
    pub db_path: String,
    /// Address the API binds to.
    pub bind_addr: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Base URL of the upstream scoring provider.
    pub scores_base_url: String,
    /// Scheduler poll interval in seconds.
    pub poll_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "poolhouse.db".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-in-production".to_string()),
            scores_base_url: env::var("SCORES_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            poll_secs: env::var("SCHEDULER_POLL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|&v| v > 0)
                .unwrap_or(60),
        }
    }
}
