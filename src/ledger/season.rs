//! Season Transition Processor
//! Mission: Settle last season's balance into this season's round 0
//!
//! The prior balance and the entry fee never mix into one opaque number
//! unless the fee is paid out of credit, in which case the single
//! carry-over transaction already nets the fee out.

use super::{EntryKey, LedgerError, LedgerStore};
use crate::models::{
    round_cents, League, ParticipantId, Round, SeasonConfig, SeasonYear, Transaction,
    TransactionKind,
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SeasonError {
    /// The participant owes money from the prior season and league policy
    /// blocks entry until it is settled.
    #[error("participant {participant} carries a negative prior balance of {balance}")]
    NegativeBalanceBlocked {
        participant: ParticipantId,
        balance: f64,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Outcome of one participant's season opening.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// Fee was covered by prior-season credit; one carry-over transaction
    /// holds the remainder.
    PaidFromCredit { remainder: f64 },
    /// Fee charged in full; prior balance (if any) carried over separately.
    Charged { fee: f64, carried_over: f64 },
    /// Round-0 transactions for this season already exist.
    AlreadyProcessed,
}

pub struct SeasonTransitionProcessor<'a> {
    ledger: &'a LedgerStore,
}

impl<'a> SeasonTransitionProcessor<'a> {
    pub fn new(ledger: &'a LedgerStore) -> Self {
        Self { ledger }
    }

    /// Opens `season` for one participant: reads the prior season's final
    /// balance, applies the entry fee per league policy, and writes the
    /// round-0 transactions. Idempotent: a season already opened is left
    /// exactly as it is.
    pub async fn open_season(
        &self,
        league_key: &EntryKey,
        rules: &SeasonConfig,
    ) -> Result<TransitionOutcome, SeasonError> {
        let current = self.ledger.read(league_key).await?;
        if let Some(snap) = &current {
            let already = snap
                .transactions
                .iter()
                .any(|t| t.round.is_season_marker() && t.kind.is_season_marker());
            if already {
                info!(key = %league_key, "Season already opened; leaving round 0 untouched");
                return Ok(TransitionOutcome::AlreadyProcessed);
            }
        }

        // The first representable season has nothing before it.
        let prior_key = league_key.season.0.checked_sub(1).map(|prior| EntryKey {
            league: league_key.league.clone(),
            season: SeasonYear(prior),
            participant: league_key.participant,
        });
        let prior_balance = match &prior_key {
            Some(key) => self.ledger.read(key).await?.map_or(0.0, |snap| snap.balance),
            None => 0.0,
        };

        if rules.block_negative_entry && prior_balance < -0.01 {
            warn!(
                key = %league_key,
                prior_balance,
                "🚫 Entry blocked: prior-season debt unsettled"
            );
            return Err(SeasonError::NegativeBalanceBlocked {
                participant: league_key.participant,
                balance: prior_balance,
            });
        }

        let fee = rules.entry_fee;
        let season = league_key.season;

        if let Some(prior) = &prior_key {
            if rules.allow_credit_payment && prior_balance > fee {
                // Fee netted out of credit: one carry-over holds the remainder.
                let remainder = round_cents(prior_balance - fee);
                self.ledger
                    .apply_carry_over(
                        league_key,
                        remainder,
                        format!("carry-over from {} (entry fee {} deducted)", prior.season, fee),
                    )
                    .await?;
                info!(key = %league_key, remainder, "💳 Entry fee paid from prior-season credit");
                return Ok(TransitionOutcome::PaidFromCredit { remainder });
            }
        }

        let mut transactions = vec![Transaction::new(
            Round::SEASON_MARKER,
            TransactionKind::SeasonEntryFee,
            -fee,
            format!("entry fee {}", season),
        )];
        if let Some(prior) = &prior_key {
            if prior_balance.abs() > 0.01 {
                transactions.push(Transaction::new(
                    Round::SEASON_MARKER,
                    TransactionKind::SeasonCarryOver,
                    prior_balance,
                    format!("carry-over from {}", prior.season),
                ));
            }
        }
        let carried_over = if prior_balance.abs() > 0.01 {
            prior_balance
        } else {
            0.0
        };
        self.ledger
            .apply_season_transactions(league_key, transactions)
            .await?;
        info!(key = %league_key, fee, carried_over, "🏁 Season opened");
        Ok(TransitionOutcome::Charged { fee, carried_over })
    }

    /// Opens the season for every rostered participant. One participant's
    /// failure never blocks the others; every outcome is reported.
    pub async fn open_league_season(
        &self,
        league: &League,
    ) -> Vec<(ParticipantId, Result<TransitionOutcome, SeasonError>)> {
        let mut results = Vec::with_capacity(league.roster.len());
        for entry in &league.roster {
            let key = EntryKey {
                league: league.id.clone(),
                season: league.season,
                participant: entry.id,
            };
            let result = self.open_season(&key, &league.season_rules).await;
            if let Err(e) = &result {
                warn!(key = %key, "⚠️ Season opening failed for participant: {}", e);
            }
            results.push((entry.id, result));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeagueConfig, LeagueId, RosterEntry};
    use tempfile::NamedTempFile;

    fn test_store() -> (LedgerStore, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let store = LedgerStore::new(temp.path().to_str().unwrap()).unwrap();
        (store, temp)
    }

    fn key(season: u16) -> EntryKey {
        EntryKey {
            league: LeagueId::parse("test-league").unwrap(),
            season: SeasonYear(season),
            participant: ParticipantId(7),
        }
    }

    fn rules(fee: f64, credit: bool, block: bool) -> SeasonConfig {
        SeasonConfig {
            entry_fee: fee,
            allow_credit_payment: credit,
            block_negative_entry: block,
        }
    }

    async fn seed_prior_balance(store: &LedgerStore, season: u16, balance: f64) {
        store
            .upsert_round(
                &key(season),
                Round(38),
                vec![Transaction::new(
                    Round(38),
                    TransactionKind::RankBonus,
                    balance,
                    "final round",
                )],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fee_paid_from_credit_leaves_single_remainder() {
        let (store, _temp) = test_store();
        seed_prior_balance(&store, 2025, 180.0).await;

        let processor = SeasonTransitionProcessor::new(&store);
        let outcome = processor
            .open_season(&key(2026), &rules(100.0, true, false))
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::PaidFromCredit { remainder: 80.0 });

        let snap = store.read(&key(2026)).await.unwrap().unwrap();
        assert_eq!(snap.transactions.len(), 1);
        assert_eq!(snap.transactions[0].kind, TransactionKind::SeasonCarryOver);
        assert_eq!(snap.balance, 80.0);
    }

    #[tokio::test]
    async fn test_fee_charged_and_debt_carried_over() {
        let (store, _temp) = test_store();
        seed_prior_balance(&store, 2025, -40.0).await;

        let processor = SeasonTransitionProcessor::new(&store);
        let outcome = processor
            .open_season(&key(2026), &rules(100.0, true, false))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Charged {
                fee: 100.0,
                carried_over: -40.0
            }
        );

        let snap = store.read(&key(2026)).await.unwrap().unwrap();
        assert_eq!(snap.transactions.len(), 2);
        assert_eq!(snap.balance, -140.0);
    }

    #[tokio::test]
    async fn test_new_participant_pays_fee_only() {
        let (store, _temp) = test_store();
        let processor = SeasonTransitionProcessor::new(&store);
        let outcome = processor
            .open_season(&key(2026), &rules(100.0, true, false))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Charged {
                fee: 100.0,
                carried_over: 0.0
            }
        );
        let snap = store.read(&key(2026)).await.unwrap().unwrap();
        assert_eq!(snap.transactions.len(), 1);
        assert_eq!(snap.balance, -100.0);
    }

    #[tokio::test]
    async fn test_open_season_is_idempotent() {
        let (store, _temp) = test_store();
        seed_prior_balance(&store, 2025, 180.0).await;

        let processor = SeasonTransitionProcessor::new(&store);
        processor
            .open_season(&key(2026), &rules(100.0, true, false))
            .await
            .unwrap();
        let outcome = processor
            .open_season(&key(2026), &rules(100.0, true, false))
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::AlreadyProcessed);

        let snap = store.read(&key(2026)).await.unwrap().unwrap();
        assert_eq!(snap.balance, 80.0);
    }

    #[tokio::test]
    async fn test_negative_entry_blocked_by_policy() {
        let (store, _temp) = test_store();
        seed_prior_balance(&store, 2025, -40.0).await;

        let processor = SeasonTransitionProcessor::new(&store);
        let err = processor
            .open_season(&key(2026), &rules(100.0, true, true))
            .await
            .unwrap_err();
        assert!(matches!(err, SeasonError::NegativeBalanceBlocked { .. }));
        assert!(store.read(&key(2026)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_representable_season_has_no_prior() {
        let (store, _temp) = test_store();
        let processor = SeasonTransitionProcessor::new(&store);
        let outcome = processor
            .open_season(&key(0), &rules(100.0, true, true))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Charged {
                fee: 100.0,
                carried_over: 0.0
            }
        );
        let snap = store.read(&key(0)).await.unwrap().unwrap();
        assert_eq!(snap.balance, -100.0);
    }

    #[tokio::test]
    async fn test_blocked_participant_does_not_abort_the_roster() {
        let (store, _temp) = test_store();
        // Participant 7 owes money from 2025; participant 8 is clean.
        seed_prior_balance(&store, 2025, -40.0).await;

        let league = League {
            id: LeagueId::parse("test-league").unwrap(),
            name: "Test League".to_string(),
            owner: "admin".to_string(),
            season: SeasonYear(2026),
            config: LeagueConfig::default(),
            season_rules: rules(100.0, true, true),
            roster: vec![
                RosterEntry {
                    id: ParticipantId(7),
                    name: "debtor".to_string(),
                    withdrawn_at: None,
                },
                RosterEntry {
                    id: ParticipantId(8),
                    name: "clean".to_string(),
                    withdrawn_at: None,
                },
            ],
        };

        let processor = SeasonTransitionProcessor::new(&store);
        let results = processor.open_league_season(&league).await;
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0].1,
            Err(SeasonError::NegativeBalanceBlocked { .. })
        ));
        assert!(results[1].1.is_ok());

        // The clean participant opened despite the earlier block.
        let key8 = EntryKey {
            league: LeagueId::parse("test-league").unwrap(),
            season: SeasonYear(2026),
            participant: ParticipantId(8),
        };
        assert_eq!(store.read(&key8).await.unwrap().unwrap().balance, -100.0);
        assert!(store.read(&key(2026)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credit_equal_to_fee_charges_normally() {
        let (store, _temp) = test_store();
        seed_prior_balance(&store, 2025, 100.0).await;

        let processor = SeasonTransitionProcessor::new(&store);
        let outcome = processor
            .open_season(&key(2026), &rules(100.0, true, false))
            .await
            .unwrap();
        // prior == fee is not strictly greater; fee and carry-over stay
        // separate and net to zero.
        assert_eq!(
            outcome,
            TransitionOutcome::Charged {
                fee: 100.0,
                carried_over: 100.0
            }
        );
        let snap = store.read(&key(2026)).await.unwrap().unwrap();
        assert_eq!(snap.transactions.len(), 2);
        assert_eq!(snap.balance, 0.0);
    }
}
