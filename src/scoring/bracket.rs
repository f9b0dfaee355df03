//! Knockout Pool
//! Mission: Seeded single-elimination progression derived purely from scores

use super::ranking;
use crate::models::{BracketConfig, ParticipantId, ParticipantScore, Round, ScoreHistory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A seeded entrant. Seed 1 is the best qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    pub seed: usize,
    pub participant: ParticipantId,
}

/// One elimination match at a given stage and season round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketMatch {
    /// 0-based stage index; stage 0 is the opening stage.
    pub stage: usize,
    pub round: Round,
    pub home: Seed,
    pub away: Seed,
    pub home_points: Option<f64>,
    pub away_points: Option<f64>,
    pub winner: Seed,
    /// True when the match could not be split on points and the higher
    /// seed advanced.
    pub decided_by_seed: bool,
}

/// Full bracket state derived from the score history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BracketProgression {
    pub seeds: Vec<Seed>,
    pub matches: Vec<BracketMatch>,
}

impl BracketProgression {
    pub fn champion(&self) -> Option<Seed> {
        self.matches.last().map(|m| m.winner)
    }
}

/// Seeds the bracket from the ranking snapshot at the qualifying round:
/// cumulative points over rounds 1..=qualifying_round, ties broken by the
/// stable order of `participants`. Top `size` qualify.
pub fn seed_bracket(
    config: &BracketConfig,
    participants: &[ParticipantId],
    history: &ScoreHistory,
) -> Vec<Seed> {
    let mut totals: HashMap<ParticipantId, f64> = HashMap::new();
    let mut played: HashMap<ParticipantId, bool> = HashMap::new();

    for (round, scores) in history {
        if *round > config.qualifying_round || round.is_season_marker() {
            continue;
        }
        for s in scores {
            if let Some(points) = s.points {
                *totals.entry(s.participant).or_insert(0.0) += points;
                played.insert(s.participant, true);
            }
        }
    }

    // Reuse the ranking tie-break: stable order of the roster.
    let snapshot: Vec<ParticipantScore> = participants
        .iter()
        .filter(|p| played.get(*p).copied().unwrap_or(false))
        .map(|p| ParticipantScore {
            participant: *p,
            points: totals.get(p).copied(),
        })
        .collect();

    ranking::rank_round(&snapshot)
        .into_iter()
        .take(config.size)
        .map(|r| Seed {
            seed: r.rank,
            participant: r.participant,
        })
        .collect()
}

/// Derives the elimination progression from seeding through the last round
/// present in `history`, capped at `through`. Pure function of its inputs.
///
/// Advancement rule per match: higher round score wins; if scores tie or
/// either is unknown, the higher seed (numerically lower) advances. This is
/// fixed, never random.
pub fn progression(
    config: &BracketConfig,
    participants: &[ParticipantId],
    history: &ScoreHistory,
    through: Round,
) -> BracketProgression {
    let stage_count = config.stage_count();
    if stage_count == 0 {
        return BracketProgression::default();
    }

    let seeds = seed_bracket(config, participants, history);
    if seeds.len() < config.size {
        // Not enough qualified entrants yet; the bracket has not started.
        return BracketProgression {
            seeds,
            matches: Vec::new(),
        };
    }

    // Opening pairings: 1-vs-K, 2-vs-(K-1), ...
    let mut alive: Vec<Seed> = Vec::with_capacity(config.size);
    for i in 0..config.size / 2 {
        alive.push(seeds[i]);
        alive.push(seeds[config.size - 1 - i]);
    }

    let mut matches = Vec::new();

    for stage in 0..stage_count {
        let Some(round) = Round::parse(config.qualifying_round.0 + 1 + stage as u8) else {
            break;
        };
        if round > through {
            break;
        }
        let Some(scores) = history.get(&round) else {
            break;
        };
        let points: HashMap<ParticipantId, Option<f64>> = scores
            .iter()
            .map(|s| (s.participant, s.points))
            .collect();

        let mut next: Vec<Seed> = Vec::with_capacity(alive.len() / 2);
        for pair in alive.chunks(2) {
            let (home, away) = (pair[0], pair[1]);
            let home_points = points.get(&home.participant).copied().flatten();
            let away_points = points.get(&away.participant).copied().flatten();

            let (winner, decided_by_seed) = match (home_points, away_points) {
                (Some(a), Some(b)) if a > b => (home, false),
                (Some(a), Some(b)) if b > a => (away, false),
                (Some(_), None) => (home, false),
                (None, Some(_)) => (away, false),
                // Tie or both unknown: higher seed advances.
                _ => (if home.seed < away.seed { home } else { away }, true),
            };

            matches.push(BracketMatch {
                stage,
                round,
                home,
                away,
                home_points,
                away_points,
                winner,
                decided_by_seed,
            });
            next.push(winner);
        }
        alive = next;
        if alive.len() < 2 {
            break;
        }
    }

    BracketProgression { seeds, matches }
}

/// Bracket money attributable to one season round: the configured win/loss
/// values of the stage played at that round. Zero-valued sides are skipped.
pub fn payouts_for_round(
    config: &BracketConfig,
    participants: &[ParticipantId],
    history: &ScoreHistory,
    round: Round,
) -> Vec<(ParticipantId, f64, String)> {
    let prog = progression(config, participants, history, round);
    let mut out = Vec::new();

    for m in prog.matches.iter().filter(|m| m.round == round) {
        let Some(stage_values) = config.stages.get(m.stage) else {
            continue;
        };
        let loser = if m.winner == m.home { m.away } else { m.home };

        if stage_values.win_value != 0.0 {
            out.push((
                m.winner.participant,
                stage_values.win_value,
                format!("{} {} win vs seed {}", round, stage_values.name, loser.seed),
            ));
        }
        if stage_values.loss_value != 0.0 {
            out.push((
                loser.participant,
                stage_values.loss_value,
                format!("{} {} loss vs seed {}", round, stage_values.name, m.winner.seed),
            ));
        }
    }
    out
}
