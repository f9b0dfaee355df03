//! Scoring Provider Integration
//! Mission: Fetch round status and scores with retry, backoff and caching
//!
//! The trait is the seam the scheduler and consolidator depend on; the HTTP
//! implementation is one of several possible providers and the tests swap
//! in a scripted one.

use super::score_cache::ScoreCache;
use crate::models::{LeagueId, MarketStatus, ParticipantScore, Round};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 250;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Transient: the provider is unreachable or rate limiting. Safe to
    /// retry on the next tick; consolidation must not proceed on guesses.
    #[error("scoring provider temporarily unavailable: {0}")]
    TemporarilyUnavailable(String),

    /// Permanent for this request: the provider answered but the answer is
    /// unusable.
    #[error("scoring provider error: {0}")]
    Provider(String),
}

/// Upstream scoring provider. Implementations must be safe to call
/// concurrently from the scheduler and the API.
#[async_trait]
pub trait ScoringSource: Send + Sync {
    /// Market status of one round.
    async fn get_round_status(&self, round: Round) -> Result<MarketStatus, SourceError>;

    /// Final (or current, for open rounds) scores of one league's round.
    async fn get_round_scores(
        &self,
        league: &LeagueId,
        round: Round,
    ) -> Result<Vec<ParticipantScore>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ScoreRow {
    participant_id: u64,
    points: Option<f64>,
}

/// HTTP provider client. Closed-round scores are immutable upstream, so
/// they are served from the cache after the first fetch.
pub struct HttpScoringSource {
    client: Client,
    base_url: String,
    cache: ScoreCache,
}

impl HttpScoringSource {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("PoolHouse/1.0 (Ledger Consolidation)")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: ScoreCache::new(256, Duration::from_secs(6 * 3600)),
        }
    }

    /// GET with exponential backoff. 429 and transport failures retry;
    /// other non-success statuses fail immediately.
    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response, SourceError> {
        let mut backoff = INITIAL_BACKOFF_MS;

        for attempt in 0..MAX_RETRIES {
            match self.client.get(url).send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    } else if response.status() == StatusCode::TOO_MANY_REQUESTS {
                        warn!("Rate limited on attempt {}, backing off", attempt + 1);
                    } else {
                        let status = response.status();
                        let text = response.text().await.unwrap_or_default();
                        return Err(SourceError::Provider(format!("{}: {}", status, text)));
                    }
                }
                Err(e) => {
                    warn!("Request failed (attempt {}): {}", attempt + 1, e);
                }
            }

            sleep(Duration::from_millis(backoff)).await;
            backoff *= 2;
        }

        Err(SourceError::TemporarilyUnavailable(format!(
            "{} failed after {} attempts",
            url, MAX_RETRIES
        )))
    }
}

#[async_trait]
impl ScoringSource for HttpScoringSource {
    async fn get_round_status(&self, round: Round) -> Result<MarketStatus, SourceError> {
        let url = format!("{}/rounds/{}/status", self.base_url, round.0);
        let response = self.get_with_retry(&url).await?;
        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Provider(format!("bad status payload: {}", e)))?;

        MarketStatus::from_str(&body.status)
            .ok_or_else(|| SourceError::Provider(format!("unknown market status: {}", body.status)))
    }

    async fn get_round_scores(
        &self,
        league: &LeagueId,
        round: Round,
    ) -> Result<Vec<ParticipantScore>, SourceError> {
        if let Some(cached) = self.cache.get(league, round) {
            debug!(league = %league, %round, "Score cache hit");
            return Ok(cached);
        }

        let url = format!(
            "{}/leagues/{}/rounds/{}/scores",
            self.base_url,
            league.as_str(),
            round.0
        );
        let response = self.get_with_retry(&url).await?;
        let rows: Vec<ScoreRow> = response
            .json()
            .await
            .map_err(|e| SourceError::Provider(format!("bad scores payload: {}", e)))?;

        let scores: Vec<ParticipantScore> = rows
            .into_iter()
            .map(|row| ParticipantScore {
                participant: crate::models::ParticipantId(row.participant_id),
                points: row.points,
            })
            .collect();

        // Only settled rounds are safe to cache.
        if self.get_round_status(round).await? == MarketStatus::Closed {
            self.cache.put(league, round, scores.clone());
        }

        info!(
            league = %league,
            %round,
            "Fetched {} participant scores",
            scores.len()
        );
        Ok(scores)
    }
}
