//! League & Season Configuration
//! Mission: Per-league scoring policy as data, never as engine constants

use super::{LeagueId, ParticipantId, Round, SeasonYear};
use serde::{Deserialize, Serialize};

/// One entrant of a league season. Withdrawn participants keep their
/// history but generate no transactions after the withdrawal round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: ParticipantId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawn_at: Option<Round>,
}

impl RosterEntry {
    pub fn is_active_at(&self, round: Round) -> bool {
        match self.withdrawn_at {
            Some(withdrawn) => round <= withdrawn,
            None => true,
        }
    }
}

/// Rank -> value table. `values[0]` is the value for rank 1; ranks beyond
/// the table's domain are worth zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonusTable {
    pub values: Vec<f64>,
    /// Optional second phase that replaces `values` from a transition round on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_two: Option<BonusPhase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonusPhase {
    pub from_round: Round,
    pub values: Vec<f64>,
}

/// Round-robin pool settings. All payout magnitudes are league policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRobinConfig {
    pub enabled: bool,
    /// Season round at which the schedule's first round is played.
    pub start_round: Round,
    pub draw_tolerance: f64,
    pub blowout_threshold: f64,
    pub win_value: f64,
    pub draw_value: f64,
    pub blowout_value: f64,
}

impl Default for RoundRobinConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_round: Round(7),
            draw_tolerance: 0.3,
            blowout_threshold: 50.0,
            win_value: 5.0,
            draw_value: 3.0,
            blowout_value: 7.0,
        }
    }
}

/// Money attached to one elimination stage. Neither side is required to be
/// the other's negation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketStageValues {
    pub name: String,
    pub win_value: f64,
    pub loss_value: f64,
}

/// Knockout pool settings. `size` participants are seeded from the ranking
/// snapshot at `qualifying_round`; stage `i` is played at
/// `qualifying_round + 1 + i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketConfig {
    pub enabled: bool,
    pub size: usize,
    pub qualifying_round: Round,
    pub stages: Vec<BracketStageValues>,
}

impl Default for BracketConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size: 8,
            qualifying_round: Round(19),
            stages: Vec::new(),
        }
    }
}

impl BracketConfig {
    /// Number of elimination stages the configured size implies.
    pub fn stage_count(&self) -> usize {
        if self.size < 2 || !self.size.is_power_of_two() {
            return 0;
        }
        self.size.trailing_zeros() as usize
    }
}

/// Weekly extremes settings. `best[0]` / `worst[0]` are the values for the
/// single best / single worst performer of a round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopBottomConfig {
    pub enabled: bool,
    pub best: Vec<f64>,
    pub worst: Vec<f64>,
}

/// Per-season scoring configuration of one league.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus: Option<BonusTable>,
    #[serde(default)]
    pub round_robin: RoundRobinConfig,
    #[serde(default)]
    pub bracket: BracketConfig,
    #[serde(default)]
    pub top_bottom: TopBottomConfig,
}

impl Default for LeagueConfig {
    fn default() -> Self {
        Self {
            bonus: None,
            round_robin: RoundRobinConfig::default(),
            bracket: BracketConfig::default(),
            top_bottom: TopBottomConfig::default(),
        }
    }
}

/// Season entry policy: how the entry fee interacts with the prior season's
/// closing balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonConfig {
    pub entry_fee: f64,
    /// A positive prior balance may pay the fee, carrying over the remainder.
    pub allow_credit_payment: bool,
    /// A negative prior balance blocks re-entry.
    pub block_negative_entry: bool,
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self {
            entry_fee: 0.0,
            allow_credit_payment: true,
            block_negative_entry: false,
        }
    }
}

/// A league for one season: identity, tenant owner, policy and roster.
/// Immutable once rounds have been recorded against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct League {
    pub id: LeagueId,
    pub name: String,
    /// Username of the administrator that owns this league (tenant boundary).
    pub owner: String,
    pub season: SeasonYear,
    pub config: LeagueConfig,
    #[serde(default)]
    pub season_rules: SeasonConfig,
    pub roster: Vec<RosterEntry>,
}

impl League {
    /// Participants still active at the given round, in roster order.
    pub fn active_at(&self, round: Round) -> Vec<&RosterEntry> {
        self.roster.iter().filter(|p| p.is_active_at(round)).collect()
    }
}
