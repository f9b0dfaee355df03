//! Round-Robin Pool
//! Mission: All-play-all scheduling and weekly score-versus-score payouts

use crate::models::{
    round_cents, ParticipantId, ParticipantScore, Round, RoundRobinConfig, ScoreHistory,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One scheduled pairing, by participant id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub home: ParticipantId,
    pub away: ParticipantId,
}

/// Classic rotation schedule: fix the first entrant, rotate the rest. Odd
/// counts get a placeholder bye and any pairing involving it is skipped.
/// Produces n-1 schedule rounds for even n (n for odd n), each with
/// floor(n/2) games, every unordered pair exactly once.
pub fn schedule(participants: &[ParticipantId]) -> Vec<Vec<Pairing>> {
    let mut slots: Vec<Option<ParticipantId>> = participants.iter().copied().map(Some).collect();
    if slots.len() < 2 {
        return Vec::new();
    }
    if slots.len() % 2 != 0 {
        slots.push(None); // bye
    }

    let rounds = slots.len() - 1;
    let mut out = Vec::with_capacity(rounds);

    for _ in 0..rounds {
        let mut games = Vec::with_capacity(slots.len() / 2);
        for i in 0..slots.len() / 2 {
            let home = slots[i];
            let away = slots[slots.len() - 1 - i];
            if let (Some(home), Some(away)) = (home, away) {
                games.push(Pairing { home, away });
            }
        }
        out.push(games);

        // Rotate everything but the first slot.
        let last = slots.pop().unwrap_or(None);
        slots.insert(1, last);
    }

    out
}

/// Pairings played at a given season round, mapped through the configured
/// start round. None when the season round precedes the pool or the
/// schedule has run out.
pub fn pairings_for_round(
    config: &RoundRobinConfig,
    participants: &[ParticipantId],
    round: Round,
) -> Option<Vec<Pairing>> {
    if round < config.start_round {
        return None;
    }
    let schedule_index = (round.0 - config.start_round.0) as usize;
    let full = schedule(participants);
    full.into_iter().nth(schedule_index)
}

/// How one pairing resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Draw,
    Win,
    Blowout,
    /// Either side's score was unknown; no transactions are produced.
    Void,
}

/// Resolved pairing: payouts per side plus match points for the standings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairingOutcome {
    pub kind: OutcomeKind,
    pub home_payout: f64,
    pub away_payout: f64,
    pub home_match_points: u8,
    pub away_match_points: u8,
}

/// Applies the draw/blowout/win rule to one pairing's scores. Draw payouts
/// are symmetric and positive for both sides; win and blowout payouts are
/// zero-sum by construction.
pub fn resolve(config: &RoundRobinConfig, home: Option<f64>, away: Option<f64>) -> PairingOutcome {
    let (a, b) = match (home, away) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return PairingOutcome {
                kind: OutcomeKind::Void,
                home_payout: 0.0,
                away_payout: 0.0,
                home_match_points: 0,
                away_match_points: 0,
            }
        }
    };

    // Scores carry two decimals; compare at cent precision so a pairing
    // sitting exactly on the tolerance (e.g. 10.0 vs 10.3) is a draw and
    // not a float-representation win.
    let diff = round_cents((a - b).abs());

    if diff <= config.draw_tolerance {
        return PairingOutcome {
            kind: OutcomeKind::Draw,
            home_payout: config.draw_value,
            away_payout: config.draw_value,
            home_match_points: 1,
            away_match_points: 1,
        };
    }

    let magnitude = if diff >= config.blowout_threshold {
        config.blowout_value
    } else {
        config.win_value
    };
    let kind = if diff >= config.blowout_threshold {
        OutcomeKind::Blowout
    } else {
        OutcomeKind::Win
    };

    if a > b {
        PairingOutcome {
            kind,
            home_payout: magnitude,
            away_payout: -magnitude,
            home_match_points: 3,
            away_match_points: 0,
        }
    } else {
        PairingOutcome {
            kind,
            home_payout: -magnitude,
            away_payout: magnitude,
            home_match_points: 0,
            away_match_points: 3,
        }
    }
}

/// Accumulated standings row for one participant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandingsRow {
    pub participant: ParticipantId,
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub match_points: u32,
    pub scored_for: f64,
    pub scored_against: f64,
    pub money: f64,
}

/// Round-robin standings accumulated across rounds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandingsTable {
    rows: HashMap<ParticipantId, StandingsRow>,
}

impl StandingsTable {
    pub fn record(
        &mut self,
        pairing: Pairing,
        home_points: f64,
        away_points: f64,
        outcome: &PairingOutcome,
    ) {
        if outcome.kind == OutcomeKind::Void {
            return;
        }
        self.record_side(
            pairing.home,
            home_points,
            away_points,
            outcome.home_match_points,
            outcome.home_payout,
        );
        self.record_side(
            pairing.away,
            away_points,
            home_points,
            outcome.away_match_points,
            outcome.away_payout,
        );
    }

    fn record_side(
        &mut self,
        participant: ParticipantId,
        scored: f64,
        conceded: f64,
        match_points: u8,
        payout: f64,
    ) {
        let row = self.rows.entry(participant).or_insert_with(|| StandingsRow {
            participant,
            ..StandingsRow::default()
        });
        row.played += 1;
        row.match_points += match_points as u32;
        row.scored_for += scored;
        row.scored_against += conceded;
        row.money += payout;
        match match_points {
            3 => row.wins += 1,
            1 => row.draws += 1,
            _ => row.losses += 1,
        }
    }

    /// Rows ordered by match points, then score balance, then wins.
    pub fn ordered(&self) -> Vec<StandingsRow> {
        let mut rows: Vec<StandingsRow> = self.rows.values().cloned().collect();
        rows.sort_by(|a, b| {
            b.match_points
                .cmp(&a.match_points)
                .then_with(|| {
                    let da = a.scored_for - a.scored_against;
                    let db = b.scored_for - b.scored_against;
                    db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.wins.cmp(&a.wins))
                .then_with(|| a.participant.cmp(&b.participant))
        });
        rows
    }
}

/// Accumulates the standings table over every round-robin round played
/// through `through`. Rounds missing from the history and void pairings
/// contribute nothing.
pub fn standings(
    config: &RoundRobinConfig,
    participants: &[ParticipantId],
    history: &ScoreHistory,
    through: Round,
) -> StandingsTable {
    let mut table = StandingsTable::default();
    if !config.enabled {
        return table;
    }

    for (round, scores) in history {
        if *round > through || round.is_season_marker() {
            continue;
        }
        let Some(pairings) = pairings_for_round(config, participants, *round) else {
            continue;
        };
        let points: HashMap<ParticipantId, Option<f64>> = scores
            .iter()
            .map(|s| (s.participant, s.points))
            .collect();

        for pairing in pairings {
            let home = points.get(&pairing.home).copied().flatten();
            let away = points.get(&pairing.away).copied().flatten();
            let outcome = resolve(config, home, away);
            if outcome.kind == OutcomeKind::Void {
                continue;
            }
            table.record(
                pairing,
                home.unwrap_or(0.0),
                away.unwrap_or(0.0),
                &outcome,
            );
        }
    }
    table
}

/// Per-participant payouts for one season round, with the descriptions used
/// on the ledger transactions.
pub fn payouts_for_round(
    config: &RoundRobinConfig,
    participants: &[ParticipantId],
    round: Round,
    scores: &[ParticipantScore],
) -> Vec<(ParticipantId, f64, String)> {
    let Some(pairings) = pairings_for_round(config, participants, round) else {
        return Vec::new();
    };

    let points: HashMap<ParticipantId, Option<f64>> = scores
        .iter()
        .map(|s| (s.participant, s.points))
        .collect();

    let mut out = Vec::new();
    for pairing in pairings {
        let home = points.get(&pairing.home).copied().flatten();
        let away = points.get(&pairing.away).copied().flatten();
        let outcome = resolve(config, home, away);
        if outcome.kind == OutcomeKind::Void {
            continue;
        }

        let label = match outcome.kind {
            OutcomeKind::Draw => "draw",
            OutcomeKind::Win => "win",
            OutcomeKind::Blowout => "blowout",
            OutcomeKind::Void => unreachable!(),
        };
        out.push((
            pairing.home,
            outcome.home_payout,
            format!("{} {} vs {}", round, label, pairing.away),
        ));
        out.push((
            pairing.away,
            outcome.away_payout,
            format!("{} {} vs {}", round, label, pairing.home),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ids(n: u64) -> Vec<ParticipantId> {
        (1..=n).map(ParticipantId).collect()
    }

    fn cfg() -> RoundRobinConfig {
        RoundRobinConfig {
            enabled: true,
            start_round: Round(1),
            draw_tolerance: 0.3,
            blowout_threshold: 50.0,
            win_value: 5.0,
            draw_value: 3.0,
            blowout_value: 7.0,
        }
    }

    #[test]
    fn test_even_schedule_shape() {
        let rounds = schedule(&ids(6));
        assert_eq!(rounds.len(), 5);
        for games in &rounds {
            assert_eq!(games.len(), 3);
        }
    }

    #[test]
    fn test_odd_schedule_has_one_bye_per_round() {
        let rounds = schedule(&ids(5));
        assert_eq!(rounds.len(), 5);
        let mut byes: Vec<u64> = Vec::new();
        for games in &rounds {
            assert_eq!(games.len(), 2);
            let playing: HashSet<u64> = games
                .iter()
                .flat_map(|g| [g.home.0, g.away.0])
                .collect();
            let sitting: Vec<u64> = (1..=5).filter(|i| !playing.contains(i)).collect();
            assert_eq!(sitting.len(), 1);
            byes.push(sitting[0]);
        }
        // Every participant sits out exactly once across the rotation.
        let unique: HashSet<u64> = byes.iter().copied().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_every_unordered_pair_exactly_once() {
        for n in [4u64, 5, 8, 9] {
            let rounds = schedule(&ids(n));
            let mut seen: HashSet<(u64, u64)> = HashSet::new();
            for games in &rounds {
                for g in games {
                    let pair = if g.home.0 < g.away.0 {
                        (g.home.0, g.away.0)
                    } else {
                        (g.away.0, g.home.0)
                    };
                    assert!(seen.insert(pair), "pair {:?} scheduled twice", pair);
                }
            }
            let expected = (n * (n - 1) / 2) as usize;
            assert_eq!(seen.len(), expected, "n={}", n);
        }
    }

    #[test]
    fn test_draw_within_tolerance() {
        // 87.4 vs 87.6: diff 0.2 is a draw, both sides paid the draw value.
        let outcome = resolve(&cfg(), Some(87.4), Some(87.6));
        assert_eq!(outcome.kind, OutcomeKind::Draw);
        assert_eq!(outcome.home_payout, 3.0);
        assert_eq!(outcome.away_payout, 3.0);
    }

    #[test]
    fn test_blowout_is_zero_sum() {
        // 120.0 vs 60.0: diff 60 is a blowout.
        let outcome = resolve(&cfg(), Some(120.0), Some(60.0));
        assert_eq!(outcome.kind, OutcomeKind::Blowout);
        assert_eq!(outcome.home_payout, 7.0);
        assert_eq!(outcome.away_payout, -7.0);
    }

    #[test]
    fn test_normal_win_is_zero_sum() {
        let outcome = resolve(&cfg(), Some(61.0), Some(80.0));
        assert_eq!(outcome.kind, OutcomeKind::Win);
        assert_eq!(outcome.home_payout, -5.0);
        assert_eq!(outcome.away_payout, 5.0);
        assert_eq!(outcome.home_payout + outcome.away_payout, 0.0);
    }

    #[test]
    fn test_unknown_score_voids_pairing() {
        let outcome = resolve(&cfg(), None, Some(80.0));
        assert_eq!(outcome.kind, OutcomeKind::Void);
        assert_eq!(outcome.home_payout, 0.0);
        assert_eq!(outcome.away_payout, 0.0);
    }

    #[test]
    fn test_boundary_exactly_at_thresholds() {
        // diff == tolerance is still a draw; diff == threshold is a blowout.
        assert_eq!(resolve(&cfg(), Some(10.0), Some(10.3)).kind, OutcomeKind::Draw);
        assert_eq!(
            resolve(&cfg(), Some(100.0), Some(50.0)).kind,
            OutcomeKind::Blowout
        );
        assert_eq!(
            resolve(&cfg(), Some(99.9), Some(50.0)).kind,
            OutcomeKind::Win
        );
        // Same boundaries reached through inexact f64 subtraction.
        assert_eq!(resolve(&cfg(), Some(60.1), Some(10.1)).kind, OutcomeKind::Blowout);
        assert_eq!(resolve(&cfg(), Some(10.3), Some(10.0)).kind, OutcomeKind::Draw);
    }

    #[test]
    fn test_payouts_respect_start_round() {
        let participants = ids(4);
        let scores: Vec<ParticipantScore> = participants
            .iter()
            .map(|&p| ParticipantScore {
                participant: p,
                points: Some(p.0 as f64 * 10.0),
            })
            .collect();

        let mut config = cfg();
        config.start_round = Round(7);

        assert!(payouts_for_round(&config, &participants, Round(6), &scores).is_empty());
        let payouts = payouts_for_round(&config, &participants, Round(7), &scores);
        assert_eq!(payouts.len(), 4); // 2 games, 2 sides each
    }

    #[test]
    fn test_standings_accumulation() {
        let mut table = StandingsTable::default();
        let pairing = Pairing {
            home: ParticipantId(1),
            away: ParticipantId(2),
        };
        let outcome = resolve(&cfg(), Some(80.0), Some(60.0));
        table.record(pairing, 80.0, 60.0, &outcome);

        let rows = table.ordered();
        assert_eq!(rows[0].participant, ParticipantId(1));
        assert_eq!(rows[0].wins, 1);
        assert_eq!(rows[0].match_points, 3);
        assert_eq!(rows[0].money, 5.0);
        assert_eq!(rows[1].losses, 1);
        assert_eq!(rows[1].money, -5.0);
    }

    #[test]
    fn test_standings_over_history() {
        let participants = ids(4);
        let mut history = ScoreHistory::new();
        // Participant i scores i*10 every round: higher id never loses.
        for r in 1..=3u8 {
            history.insert(
                Round(r),
                participants
                    .iter()
                    .map(|&p| ParticipantScore {
                        participant: p,
                        points: Some(p.0 as f64 * 10.0),
                    })
                    .collect(),
            );
        }

        let table = standings(&cfg(), &participants, &history, Round(3));
        let rows = table.ordered();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].participant, ParticipantId(4));
        assert_eq!(rows[0].played, 3);
        assert_eq!(rows[0].wins, 3);
        assert_eq!(rows[3].participant, ParticipantId(1));
        assert_eq!(rows[3].losses, 3);

        // Capping at round 2 drops a game from everyone.
        let capped = standings(&cfg(), &participants, &history, Round(2));
        assert!(capped.ordered().iter().all(|r| r.played == 2));
    }

    #[test]
    fn test_standings_disabled_config_is_empty() {
        let participants = ids(4);
        let mut history = ScoreHistory::new();
        history.insert(
            Round(1),
            participants
                .iter()
                .map(|&p| ParticipantScore {
                    participant: p,
                    points: Some(50.0),
                })
                .collect(),
        );
        let config = RoundRobinConfig {
            enabled: false,
            ..cfg()
        };
        assert!(standings(&config, &participants, &history, Round(1))
            .ordered()
            .is_empty());
    }
}
