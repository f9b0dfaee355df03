//! Ledger Computation Engine
//! Mission: One pure, deterministic function from scores to transactions
//!
//! Both the scheduler and the administrative repair path re-enter through
//! `compute_round`; re-running it for the same inputs produces identical
//! output, which is what makes consolidation idempotent.

use super::{bonus_table, bracket, ranking, round_robin, top_bottom};
use crate::models::{
    League, ParticipantId, ParticipantScore, Round, ScoreHistory, Transaction, TransactionKind,
};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Computed transactions for one round, per participant. BTreeMap keeps the
/// output ordering deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundComputation {
    pub round: Round,
    pub transactions: BTreeMap<ParticipantId, Vec<Transaction>>,
}

impl RoundComputation {
    pub fn for_participant(&self, participant: ParticipantId) -> &[Transaction] {
        self.transactions
            .get(&participant)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Computes every enabled module's transactions for one round. Pure: the
/// result depends only on (league config, round, score history through the
/// round). One transaction per module contribution, never pre-summed.
pub fn compute_round(league: &League, round: Round, history: &ScoreHistory) -> RoundComputation {
    let active = league.active_at(round);
    let active_ids: Vec<ParticipantId> = active.iter().map(|p| p.id).collect();
    // Schedules and seedings are built from the full roster so a mid-season
    // withdrawal never reshuffles everyone else's pairings; pairings that
    // involve a withdrawn participant void on the missing score instead.
    let roster_ids: Vec<ParticipantId> = league.roster.iter().map(|p| p.id).collect();

    // Reorder provider scores into roster order so tie-breaks are stable
    // regardless of how the source happened to list participants.
    let provider: HashMap<ParticipantId, Option<f64>> = history
        .get(&round)
        .map(|scores| scores.iter().map(|s| (s.participant, s.points)).collect())
        .unwrap_or_default();
    let scores: Vec<ParticipantScore> = active_ids
        .iter()
        .map(|&id| ParticipantScore {
            participant: id,
            points: provider.get(&id).copied().flatten(),
        })
        .collect();

    let mut transactions: BTreeMap<ParticipantId, Vec<Transaction>> = BTreeMap::new();
    let mut push = |participant: ParticipantId, tx: Transaction| {
        transactions.entry(participant).or_default().push(tx);
    };

    if let Some(table) = &league.config.bonus {
        if table.values.is_empty() && table.phase_two.is_none() {
            warn!(
                league = %league.id,
                %round,
                "⚠️ Empty bonus table configured; defaulting all ranks to zero"
            );
        }
        for ranked in ranking::rank_round(&scores) {
            let value = bonus_table::value_for(table, ranked.rank, round);
            if value != 0.0 {
                push(
                    ranked.participant,
                    Transaction::new(
                        round,
                        TransactionKind::RankBonus,
                        value,
                        format!("{}: rank {}", round, ranked.rank),
                    ),
                );
            }
        }
    }

    if league.config.round_robin.enabled {
        for (participant, value, description) in
            round_robin::payouts_for_round(&league.config.round_robin, &roster_ids, round, &scores)
        {
            push(
                participant,
                Transaction::new(round, TransactionKind::RoundRobin, value, description),
            );
        }
    }

    if league.config.bracket.enabled {
        for (participant, value, description) in
            bracket::payouts_for_round(&league.config.bracket, &roster_ids, history, round)
        {
            push(
                participant,
                Transaction::new(round, TransactionKind::Bracket, value, description),
            );
        }
    }

    if league.config.top_bottom.enabled {
        for (participant, value, description) in
            top_bottom::payouts_for_round(&league.config.top_bottom, &scores)
        {
            push(
                participant,
                Transaction::new(round, TransactionKind::WeeklyExtreme, value, description),
            );
        }
    }

    RoundComputation {
        round,
        transactions,
    }
}
