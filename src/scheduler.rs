//! Consolidation Scheduler
//! Mission: Watch market status and consolidate the moment a round closes
//!
//! Phase and watched round are persisted per (league, season) so a restart
//! resumes exactly where the process died. A round that closed while the
//! process was down is still caught: Idle pokes the next round and treats
//! an already-closed status as a missed closing.

use crate::consolidator::Consolidator;
use crate::leagues::LeagueStore;
use crate::models::{League, LeagueId, MarketStatus, Round, SeasonYear};
use crate::scrapers::{ScoringSource, SourceError};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Where one league sits in the consolidation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerPhase {
    /// Polling the watched round's market status.
    Watching,
    /// The watched round closed; consolidation has not completed yet.
    ClosingDetected,
    /// Consolidation in flight. Persisted so a crash mid-run is visible
    /// and retried, not forgotten.
    Consolidating,
    /// The watched round is consolidated; waiting for the next to open.
    Idle,
}

impl SchedulerPhase {
    pub fn as_str(&self) -> &str {
        match self {
            SchedulerPhase::Watching => "watching",
            SchedulerPhase::ClosingDetected => "closing_detected",
            SchedulerPhase::Consolidating => "consolidating",
            SchedulerPhase::Idle => "idle",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "watching" => Some(SchedulerPhase::Watching),
            "closing_detected" => Some(SchedulerPhase::ClosingDetected),
            "consolidating" => Some(SchedulerPhase::Consolidating),
            "idle" => Some(SchedulerPhase::Idle),
            _ => None,
        }
    }
}

/// Persisted scheduler position for one league season.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerState {
    pub phase: SchedulerPhase,
    pub round: Round,
    pub last_status: Option<MarketStatus>,
}

impl SchedulerState {
    fn initial() -> Self {
        Self {
            phase: SchedulerPhase::Watching,
            round: Round::FIRST,
            last_status: None,
        }
    }
}

/// SQLite-backed scheduler state, one row per (league, season).
pub struct SchedulerStateStore {
    db_path: String,
}

impl SchedulerStateStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        let conn = Connection::open(&store.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS scheduler_state (
                league_id TEXT NOT NULL,
                season INTEGER NOT NULL,
                phase TEXT NOT NULL,
                round INTEGER NOT NULL,
                last_status TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (league_id, season)
            )",
            [],
        )?;
        Ok(store)
    }

    pub fn load(&self, league: &LeagueId, season: SeasonYear) -> Result<SchedulerState> {
        let conn = Connection::open(&self.db_path)?;
        let row: Option<(String, i64, Option<String>)> = conn
            .query_row(
                "SELECT phase, round, last_status FROM scheduler_state
                 WHERE league_id = ?1 AND season = ?2",
                params![league.as_str(), season.0],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((phase, round, last_status)) = row else {
            return Ok(SchedulerState::initial());
        };

        Ok(SchedulerState {
            phase: SchedulerPhase::from_str(&phase).unwrap_or(SchedulerPhase::Watching),
            round: Round(round as u8),
            last_status: last_status.as_deref().and_then(MarketStatus::from_str),
        })
    }

    pub fn save(
        &self,
        league: &LeagueId,
        season: SeasonYear,
        state: &SchedulerState,
    ) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO scheduler_state (league_id, season, phase, round, last_status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(league_id, season) DO UPDATE SET
                phase = excluded.phase,
                round = excluded.round,
                last_status = excluded.last_status,
                updated_at = excluded.updated_at",
            params![
                league.as_str(),
                season.0,
                state.phase.as_str(),
                state.round.0 as i64,
                state.last_status.map(|s| s.as_str().to_string()),
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to persist scheduler state")?;
        Ok(())
    }
}

pub struct ConsolidationScheduler {
    leagues: Arc<LeagueStore>,
    source: Arc<dyn ScoringSource>,
    consolidator: Consolidator,
    state: SchedulerStateStore,
    poll_interval: Duration,
}

impl ConsolidationScheduler {
    pub fn new(
        leagues: Arc<LeagueStore>,
        source: Arc<dyn ScoringSource>,
        consolidator: Consolidator,
        state: SchedulerStateStore,
        poll_interval: Duration,
    ) -> Self {
        Self {
            leagues,
            source,
            consolidator,
            state,
            poll_interval,
        }
    }

    /// Runs the polling loop. Each tick visits every league; one league's
    /// failure never stops the others.
    pub async fn run(&self) {
        info!(
            "⏱️ Consolidation scheduler running (every {}s)",
            self.poll_interval.as_secs()
        );
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let leagues = match self.leagues.list_all() {
                Ok(leagues) => leagues,
                Err(e) => {
                    error!("❌ Failed to list leagues: {}", e);
                    continue;
                }
            };

            for league in leagues {
                if let Err(e) = self.tick_league(&league).await {
                    error!(league = %league.id, "❌ Scheduler tick failed: {}", e);
                }
            }
        }
    }

    /// Advances one league's state machine by at most one step.
    pub async fn tick_league(&self, league: &League) -> Result<()> {
        let mut state = self.state.load(&league.id, league.season)?;

        match state.phase {
            SchedulerPhase::Watching => {
                match self.source.get_round_status(state.round).await {
                    Ok(MarketStatus::Closed) => {
                        if state.last_status == Some(MarketStatus::Open) {
                            info!(
                                league = %league.id,
                                round = %state.round,
                                "🔔 Market closed; round ready to consolidate"
                            );
                        } else {
                            // Never saw the round open: startup mid-season
                            // or the open window was missed entirely.
                            info!(
                                league = %league.id,
                                round = %state.round,
                                "🔔 Round found already closed; consolidating"
                            );
                        }
                        state.phase = SchedulerPhase::ClosingDetected;
                        state.last_status = Some(MarketStatus::Closed);
                        self.state.save(&league.id, league.season, &state)?;
                        self.consolidate(league, &mut state).await?;
                    }
                    Ok(MarketStatus::Open) => {
                        state.last_status = Some(MarketStatus::Open);
                        self.state.save(&league.id, league.season, &state)?;
                    }
                    Err(SourceError::TemporarilyUnavailable(reason)) => {
                        warn!(
                            league = %league.id,
                            round = %state.round,
                            "⏳ Status poll unavailable, will retry: {}",
                            reason
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            // A persisted Consolidating phase means the process died
            // mid-run; re-entering is safe because consolidation is
            // idempotent.
            SchedulerPhase::ClosingDetected | SchedulerPhase::Consolidating => {
                self.consolidate(league, &mut state).await?;
            }
            SchedulerPhase::Idle => {
                let Some(next) = state.round.next() else {
                    return Ok(()); // season complete
                };
                match self.source.get_round_status(next).await {
                    Ok(MarketStatus::Open) => {
                        info!(league = %league.id, round = %next, "👀 Next round open; watching");
                        state.round = next;
                        state.phase = SchedulerPhase::Watching;
                        state.last_status = Some(MarketStatus::Open);
                        self.state.save(&league.id, league.season, &state)?;
                    }
                    Ok(MarketStatus::Closed) => {
                        // The whole open window passed between ticks (or
                        // during downtime). Consolidate the missed round.
                        warn!(
                            league = %league.id,
                            round = %next,
                            "⏭️ Round closed before it was ever watched"
                        );
                        state.round = next;
                        state.phase = SchedulerPhase::ClosingDetected;
                        state.last_status = Some(MarketStatus::Closed);
                        self.state.save(&league.id, league.season, &state)?;
                        self.consolidate(league, &mut state).await?;
                    }
                    Err(SourceError::TemporarilyUnavailable(reason)) => {
                        warn!(league = %league.id, "⏳ Status poll unavailable: {}", reason);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(())
    }

    /// Runs one consolidation attempt. Success moves to Idle; a source
    /// outage or partial failure stays in ClosingDetected so the next tick
    /// retries.
    async fn consolidate(&self, league: &League, state: &mut SchedulerState) -> Result<()> {
        state.phase = SchedulerPhase::Consolidating;
        self.state.save(&league.id, league.season, state)?;

        match self
            .consolidator
            .consolidate_league_round(league, state.round)
            .await
        {
            Ok(report) if report.is_complete() => {
                state.phase = SchedulerPhase::Idle;
                state.last_status = Some(MarketStatus::Closed);
                self.state.save(&league.id, league.season, state)?;
            }
            Ok(report) => {
                warn!(
                    league = %league.id,
                    round = %state.round,
                    "⚠️ {} participant writes failed; retrying next tick",
                    report.failed.len()
                );
                state.phase = SchedulerPhase::ClosingDetected;
                self.state.save(&league.id, league.season, state)?;
            }
            Err(e) => {
                warn!(
                    league = %league.id,
                    round = %state.round,
                    "⏳ Consolidation could not run, retrying next tick: {}",
                    e
                );
                state.phase = SchedulerPhase::ClosingDetected;
                self.state.save(&league.id, league.season, state)?;
            }
        }

        Ok(())
    }
}
