//! Round Consolidation
//! Mission: Turn one closed round's scores into durable ledger entries
//!
//! One participant's failure never blocks the rest: ledger writes fan out
//! per participant and failures come back as a list the scheduler (or an
//! operator) can retry. Re-running a consolidation is always safe because
//! the engine is pure and the ledger upsert is idempotent.

use crate::ledger::{EntryKey, LedgerSnapshot, LedgerStore};
use crate::models::{League, ParticipantId, Round, ScoreHistory};
use crate::scoring;
use crate::scoring::round_robin;
use crate::scrapers::{ScoringSource, SourceError};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ConsolidationError {
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Outcome of one league-round consolidation.
#[derive(Debug, Serialize)]
pub struct ConsolidationReport {
    pub round: Round,
    pub succeeded: usize,
    /// Entry keys whose ledger write failed, with the reason. Everything
    /// listed here is safe to retry.
    pub failed: Vec<(EntryKey, String)>,
}

impl ConsolidationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct Consolidator {
    source: Arc<dyn ScoringSource>,
    ledger: LedgerStore,
}

impl Consolidator {
    pub fn new(source: Arc<dyn ScoringSource>, ledger: LedgerStore) -> Self {
        Self { source, ledger }
    }

    /// Fetches score history through `round`. Bracket and standings need
    /// every prior round, not just the one being consolidated.
    async fn load_history(
        &self,
        league: &League,
        through: Round,
    ) -> Result<ScoreHistory, SourceError> {
        let mut history = ScoreHistory::new();
        let mut round = Round::FIRST;
        loop {
            let scores = self.source.get_round_scores(&league.id, round).await?;
            history.insert(round, scores);
            if round >= through {
                break;
            }
            round = match round.next() {
                Some(next) => next,
                None => break,
            };
        }
        Ok(history)
    }

    /// Consolidates one closed round for every active participant of one
    /// league. Partial failure is reported, never hidden.
    pub async fn consolidate_league_round(
        &self,
        league: &League,
        round: Round,
    ) -> Result<ConsolidationReport, ConsolidationError> {
        info!(league = %league.id, %round, "📊 Consolidating round");

        let history = self.load_history(league, round).await?;
        let computation = scoring::compute_round(league, round, &history);

        let mut handles = Vec::new();
        for entry in league.active_at(round) {
            let key = EntryKey {
                league: league.id.clone(),
                season: league.season,
                participant: entry.id,
            };
            let transactions = computation.for_participant(entry.id).to_vec();
            let ledger = self.ledger.clone();
            handles.push(tokio::spawn(async move {
                let result = ledger.upsert_round(&key, round, transactions).await;
                (key, result)
            }));
        }

        let mut succeeded = 0;
        let mut failed = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((_, Ok(_))) => succeeded += 1,
                Ok((key, Err(e))) => {
                    error!(key = %key, %round, "❌ Ledger write failed: {}", e);
                    failed.push((key, e.to_string()));
                }
                Err(e) => {
                    // Task panic; the entry key is gone with it.
                    error!(%round, "❌ Consolidation task panicked: {}", e);
                }
            }
        }

        if failed.is_empty() {
            info!(
                league = %league.id,
                %round,
                "✅ Round consolidated for {} participants",
                succeeded
            );
        } else {
            warn!(
                league = %league.id,
                %round,
                "⚠️ Round consolidated with {} failures ({} ok)",
                failed.len(),
                succeeded
            );
        }

        Ok(ConsolidationReport {
            round,
            succeeded,
            failed,
        })
    }

    /// Round-robin standings through `through`, derived from raw scores the
    /// same way consolidation derives payouts: the schedule comes from the
    /// full roster and a withdrawn participant's later scores are dropped,
    /// so their pairings void exactly as they do on the ledger.
    pub async fn standings(
        &self,
        league: &League,
        through: Round,
    ) -> Result<Vec<round_robin::StandingsRow>, ConsolidationError> {
        let history = self.load_history(league, through).await?;
        let mut scoped = ScoreHistory::new();
        for (round, scores) in history {
            let active: HashSet<ParticipantId> =
                league.active_at(round).iter().map(|p| p.id).collect();
            scoped.insert(
                round,
                scores
                    .into_iter()
                    .filter(|s| active.contains(&s.participant))
                    .collect(),
            );
        }

        let participants: Vec<ParticipantId> =
            league.roster.iter().map(|entry| entry.id).collect();
        let table = round_robin::standings(
            &league.config.round_robin,
            &participants,
            &scoped,
            through,
        );
        Ok(table.ordered())
    }

    /// Administrative repair: re-derives one participant's entry from raw
    /// scores, replaying every round through `through` via the repair path.
    /// Idempotent; running it on a healthy entry changes nothing.
    pub async fn repair_participant(
        &self,
        league: &League,
        participant: ParticipantId,
        through: Round,
    ) -> Result<LedgerSnapshot, ConsolidationError> {
        warn!(
            league = %league.id,
            %participant,
            %through,
            "🔧 Repairing participant entry from raw scores"
        );

        let key = EntryKey {
            league: league.id.clone(),
            season: league.season,
            participant,
        };
        let history = self.load_history(league, through).await?;

        let mut snapshot = None;
        let mut round = Round::FIRST;
        loop {
            let computation = scoring::compute_round(league, round, &history);
            let transactions = computation.for_participant(participant).to_vec();
            match self.ledger.repair_replace_round(&key, round, transactions).await {
                Ok(snap) => snapshot = Some(snap),
                Err(e) => {
                    error!(key = %key, %round, "❌ Repair write failed: {}", e);
                }
            }
            if round >= through {
                break;
            }
            round = match round.next() {
                Some(next) => next,
                None => break,
            };
        }

        match snapshot {
            Some(snap) => Ok(snap),
            None => Err(ConsolidationError::Source(SourceError::Provider(
                "repair produced no ledger writes".to_string(),
            ))),
        }
    }
}
