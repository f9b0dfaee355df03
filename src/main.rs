//! PoolHouse - Fantasy Pool Ledger Consolidation Engine
//! Mission: Watch round closings, consolidate ledgers, serve the books

use anyhow::{Context, Result};
use dotenv::dotenv;
use poolhouse_backend::{
    api::{create_router, AppState},
    auth::{JwtHandler, UserStore},
    config::AppConfig,
    consolidator::Consolidator,
    leagues::LeagueStore,
    ledger::LedgerStore,
    scheduler::{ConsolidationScheduler, SchedulerStateStore},
    scrapers::HttpScoringSource,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env();
    info!("🏠 PoolHouse starting (db: {})", config.db_path);

    let ledger = LedgerStore::new(&config.db_path).context("Failed to open ledger store")?;
    let leagues = Arc::new(LeagueStore::new(&config.db_path).context("Failed to open league store")?);
    let users = Arc::new(UserStore::new(&config.db_path).context("Failed to open user store")?);
    let jwt = Arc::new(JwtHandler::new(config.jwt_secret.clone()));

    let source = Arc::new(HttpScoringSource::new(&config.scores_base_url));
    let consolidator = Consolidator::new(source.clone(), ledger.clone());

    // Background consolidation scheduler
    let scheduler = ConsolidationScheduler::new(
        leagues.clone(),
        source,
        consolidator.clone(),
        SchedulerStateStore::new(&config.db_path)?,
        Duration::from_secs(config.poll_secs),
    );
    tokio::spawn(async move {
        scheduler.run().await;
    });

    let app = create_router(AppState {
        ledger,
        leagues,
        users,
        jwt,
        consolidator,
    })
    .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "poolhouse_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
