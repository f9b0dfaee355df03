//! Core Domain Models
//! Mission: One canonical typed identifier per entity, validated at the boundary

mod league;

pub use league::{
    BonusPhase, BonusTable, BracketConfig, BracketStageValues, League, LeagueConfig,
    RosterEntry, RoundRobinConfig, SeasonConfig, TopBottomConfig,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of scored rounds in a season.
pub const ROUNDS_PER_SEASON: u8 = 38;

/// Canonical league identifier: a lowercase slug, validated once at the
/// system boundary and never re-derived downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeagueId(String);

impl LeagueId {
    pub fn parse(raw: &str) -> Option<Self> {
        let slug = raw.trim();
        let valid = !slug.is_empty()
            && slug.len() <= 64
            && slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if valid {
            Some(Self(slug.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeagueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical participant identifier (external numeric id).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Season year, e.g. 2026.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SeasonYear(pub u16);

impl fmt::Display for SeasonYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Round number. 1..=38 are scored rounds; 0 is reserved for season-entry
/// and carry-over transactions that are not tied to a scored round.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Round(pub u8);

impl Round {
    pub const SEASON_MARKER: Round = Round(0);
    pub const FIRST: Round = Round(1);
    pub const LAST: Round = Round(ROUNDS_PER_SEASON);

    pub fn parse(n: u8) -> Option<Self> {
        if n <= ROUNDS_PER_SEASON {
            Some(Self(n))
        } else {
            None
        }
    }

    pub fn is_season_marker(&self) -> bool {
        self.0 == 0
    }

    pub fn next(&self) -> Option<Round> {
        if self.0 < ROUNDS_PER_SEASON {
            Some(Round(self.0 + 1))
        } else {
            None
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Market status for a round, as reported by the scoring provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "closed")]
    Closed,
}

impl MarketStatus {
    pub fn as_str(&self) -> &str {
        match self {
            MarketStatus::Open => "open",
            MarketStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(MarketStatus::Open),
            "closed" => Some(MarketStatus::Closed),
            _ => None,
        }
    }
}

/// Kind of a ledger transaction. One transaction per module contribution so
/// the breakdown stays auditable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    #[serde(rename = "rank_bonus")]
    RankBonus,
    #[serde(rename = "round_robin")]
    RoundRobin,
    #[serde(rename = "bracket")]
    Bracket,
    #[serde(rename = "weekly_extreme")]
    WeeklyExtreme,
    #[serde(rename = "season_entry_fee")]
    SeasonEntryFee,
    #[serde(rename = "season_carry_over")]
    SeasonCarryOver,
    #[serde(rename = "manual_adjustment")]
    ManualAdjustment,
    #[serde(rename = "settlement")]
    Settlement,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::RankBonus => "rank_bonus",
            TransactionKind::RoundRobin => "round_robin",
            TransactionKind::Bracket => "bracket",
            TransactionKind::WeeklyExtreme => "weekly_extreme",
            TransactionKind::SeasonEntryFee => "season_entry_fee",
            TransactionKind::SeasonCarryOver => "season_carry_over",
            TransactionKind::ManualAdjustment => "manual_adjustment",
            TransactionKind::Settlement => "settlement",
        }
    }

    /// Season-marker kinds live at round 0 and are replaced idempotently,
    /// one per (season, kind).
    pub fn is_season_marker(&self) -> bool {
        matches!(
            self,
            TransactionKind::SeasonEntryFee | TransactionKind::SeasonCarryOver
        )
    }
}

/// The atomic ledger unit. Append-only; corrections are new transactions,
/// except that the current not-yet-consolidated round may be replaced
/// wholesale until it consolidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub round: Round,
    pub kind: TransactionKind,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Transaction {
    pub fn new(round: Round, kind: TransactionKind, value: f64, description: impl Into<String>) -> Self {
        Self {
            round,
            kind,
            value: round_cents(value),
            description: Some(description.into()),
        }
    }
}

/// Round points for one participant. `None` means the round was not played
/// (bye, mid-season entry, scores not yet available).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticipantScore {
    pub participant: ParticipantId,
    pub points: Option<f64>,
}

/// Scores indexed by round, in provider order per round. BTreeMap keeps
/// iteration deterministic for the pure computation engine.
pub type ScoreHistory = BTreeMap<Round, Vec<ParticipantScore>>;

/// Monetary rounding to cents. All transaction values and balances are
/// normalized through this before storage or comparison.
pub fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Debtor/creditor classification with a one-cent tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceClass {
    Debtor,
    Creditor,
    Settled,
}

pub fn classify_balance(balance: f64) -> BalanceClass {
    if balance < -0.01 {
        BalanceClass::Debtor
    } else if balance > 0.01 {
        BalanceClass::Creditor
    } else {
        BalanceClass::Settled
    }
}
