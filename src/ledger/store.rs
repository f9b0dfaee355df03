//! Ledger Store
//! Mission: Durable per-(league, season, participant) transaction history
//! with a balance that is always reproducible from it
//!
//! Each entry is one row; the transaction list is embedded as JSON so the
//! "replace transactions + recompute balance" step is a single atomic row
//! update. Concurrent writers to the same entry serialize on a per-key
//! lock; different entries never contend on anything but the connection.

use super::LedgerError;
use crate::models::{
    round_cents, LeagueId, ParticipantId, Round, SeasonYear, Transaction, TransactionKind,
};
use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Key of one ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntryKey {
    pub league: LeagueId,
    pub season: SeasonYear,
    pub participant: ParticipantId,
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.league, self.season, self.participant)
    }
}

/// A fully-consistent view of one ledger entry: either entirely pre-write
/// or entirely post-write, never torn.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    pub key: EntryKey,
    pub transactions: Vec<Transaction>,
    pub balance: f64,
    pub gains: f64,
    pub losses: f64,
    pub last_consolidated_round: Round,
    pub version: i64,
    pub updated_at: i64,
}

#[derive(Clone)]
pub struct LedgerStore {
    conn: Arc<Mutex<Connection>>,
    locks: Arc<SyncMutex<HashMap<EntryKey, Arc<Mutex<()>>>>>,
}

impl LedgerStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open ledger db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger_entries (
                league_id TEXT NOT NULL,
                season INTEGER NOT NULL,
                participant_id INTEGER NOT NULL,
                transactions TEXT NOT NULL,
                balance REAL NOT NULL,
                gains REAL NOT NULL,
                losses REAL NOT NULL,
                last_consolidated_round INTEGER NOT NULL,
                version INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (league_id, season, participant_id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ledger_league_season
             ON ledger_entries(league_id, season)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            locks: Arc::new(SyncMutex::new(HashMap::new())),
        })
    }

    /// Per-entry write lock. Writers to the same key serialize; writers to
    /// different keys proceed independently.
    fn entry_lock(&self, key: &EntryKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.entry(key.clone()).or_default().clone()
    }

    /// Reads one entry. Lock-free with respect to the per-key write locks;
    /// the single row read is atomic, so the snapshot is never torn.
    pub async fn read(&self, key: &EntryKey) -> Result<Option<LedgerSnapshot>, LedgerError> {
        let conn = self.conn.lock().await;
        Self::read_row(&conn, key)
    }

    /// All entries of one league season, ordered by participant id.
    pub async fn list_league(
        &self,
        league: &LeagueId,
        season: SeasonYear,
    ) -> Result<Vec<LedgerSnapshot>, LedgerError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT participant_id, transactions, balance, gains, losses,
                    last_consolidated_round, version, updated_at
             FROM ledger_entries WHERE league_id = ?1 AND season = ?2
             ORDER BY participant_id ASC",
        )?;
        let rows = stmt.query_map(params![league.as_str(), season.0], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (pid, txs, balance, gains, losses, watermark, version, updated_at) = row?;
            out.push(LedgerSnapshot {
                key: EntryKey {
                    league: league.clone(),
                    season,
                    participant: ParticipantId(pid as u64),
                },
                transactions: serde_json::from_str(&txs)?,
                balance,
                gains,
                losses,
                last_consolidated_round: Round(watermark as u8),
                version,
                updated_at,
            });
        }
        Ok(out)
    }

    /// Upserts one scored round's transactions.
    ///
    /// - `round > last_consolidated_round`: replace any existing
    ///   transactions for that round (current-round recompute is allowed).
    /// - `round <= last_consolidated_round` with transactions already
    ///   present: the existing transactions are kept untouched.
    /// - `round <= last_consolidated_round` with none present: one-time
    ///   backfill of a previously-missed round, logged specially.
    ///
    /// Idempotent: repeating the call with identical transactions yields
    /// the same final state.
    pub async fn upsert_round(
        &self,
        key: &EntryKey,
        round: Round,
        transactions: Vec<Transaction>,
    ) -> Result<LedgerSnapshot, LedgerError> {
        if round.is_season_marker() {
            return Err(LedgerError::InvalidRound(round));
        }

        let lock = self.entry_lock(key);
        let _guard = lock.lock().await;

        let mut conn = self.conn.lock().await;
        let current = Self::read_row(&conn, key)?;

        let (mut held, watermark, version) = match &current {
            Some(snap) => (
                snap.transactions.clone(),
                snap.last_consolidated_round,
                snap.version,
            ),
            None => (Vec::new(), Round::SEASON_MARKER, 0),
        };

        let round_has_transactions = held.iter().any(|t| t.round == round);

        if round <= watermark && !watermark.is_season_marker() {
            if let (true, Some(snap)) = (round_has_transactions, current) {
                warn!(
                    key = %key,
                    %round,
                    "🔒 Round already consolidated; keeping existing transactions"
                );
                return Ok(snap);
            }
            info!(key = %key, %round, "🩹 Backfilling previously missed round");
        }

        held.retain(|t| t.round != round);
        held.extend(transactions);
        let new_watermark = watermark.max(round);

        Self::write_row(&mut conn, key, held, new_watermark, version + 1)
    }

    /// Administrative repair: replaces one round's transactions regardless
    /// of the consolidation watermark. Only the repair path (an idempotent
    /// replay of the pure engine) may call this.
    pub async fn repair_replace_round(
        &self,
        key: &EntryKey,
        round: Round,
        transactions: Vec<Transaction>,
    ) -> Result<LedgerSnapshot, LedgerError> {
        if round.is_season_marker() {
            return Err(LedgerError::InvalidRound(round));
        }

        let lock = self.entry_lock(key);
        let _guard = lock.lock().await;

        let mut conn = self.conn.lock().await;
        let current = Self::read_row(&conn, key)?;
        let (mut held, watermark, version) = match &current {
            Some(snap) => (
                snap.transactions.clone(),
                snap.last_consolidated_round,
                snap.version,
            ),
            None => (Vec::new(), Round::SEASON_MARKER, 0),
        };

        warn!(key = %key, %round, "🔧 Administrative repair: re-deriving round from raw scores");

        held.retain(|t| t.round != round);
        held.extend(transactions);
        Self::write_row(&mut conn, key, held, watermark.max(round), version + 1)
    }

    /// Applies season-marker (round 0) transactions. One transaction per
    /// (season, kind): an existing marker of the same kind is updated, not
    /// duplicated, so the whole call is idempotent by construction.
    pub async fn apply_season_transactions(
        &self,
        key: &EntryKey,
        transactions: Vec<Transaction>,
    ) -> Result<LedgerSnapshot, LedgerError> {
        for tx in &transactions {
            if !tx.round.is_season_marker() || !tx.kind.is_season_marker() {
                return Err(LedgerError::KindNotAllowed(tx.kind.as_str()));
            }
        }

        let lock = self.entry_lock(key);
        let _guard = lock.lock().await;

        let mut conn = self.conn.lock().await;
        let current = Self::read_row(&conn, key)?;
        let (mut held, watermark, version) = match &current {
            Some(snap) => (
                snap.transactions.clone(),
                snap.last_consolidated_round,
                snap.version,
            ),
            None => (Vec::new(), Round::SEASON_MARKER, 0),
        };

        for tx in transactions {
            held.retain(|t| !(t.round.is_season_marker() && t.kind == tx.kind));
            held.push(tx);
        }

        Self::write_row(&mut conn, key, held, watermark, version + 1)
    }

    /// Appends (or updates) the round-0 carry-over transaction.
    pub async fn apply_carry_over(
        &self,
        key: &EntryKey,
        value: f64,
        description: impl Into<String>,
    ) -> Result<LedgerSnapshot, LedgerError> {
        self.apply_season_transactions(
            key,
            vec![Transaction::new(
                Round::SEASON_MARKER,
                TransactionKind::SeasonCarryOver,
                value,
                description,
            )],
        )
        .await
    }

    /// Appends a manual adjustment or settlement. Always an append, even
    /// for already-consolidated rounds; existing transactions are never
    /// replaced through this path.
    pub async fn append_adjustment(
        &self,
        key: &EntryKey,
        transaction: Transaction,
    ) -> Result<LedgerSnapshot, LedgerError> {
        if !matches!(
            transaction.kind,
            TransactionKind::ManualAdjustment | TransactionKind::Settlement
        ) {
            return Err(LedgerError::KindNotAllowed(transaction.kind.as_str()));
        }

        let lock = self.entry_lock(key);
        let _guard = lock.lock().await;

        let mut conn = self.conn.lock().await;
        let current = Self::read_row(&conn, key)?;
        let (mut held, watermark, version) = match &current {
            Some(snap) => (
                snap.transactions.clone(),
                snap.last_consolidated_round,
                snap.version,
            ),
            None => (Vec::new(), Round::SEASON_MARKER, 0),
        };

        held.push(transaction);
        Self::write_row(&mut conn, key, held, watermark, version + 1)
    }

    fn read_row(conn: &Connection, key: &EntryKey) -> Result<Option<LedgerSnapshot>, LedgerError> {
        let mut stmt = conn.prepare_cached(
            "SELECT transactions, balance, gains, losses, last_consolidated_round,
                    version, updated_at
             FROM ledger_entries
             WHERE league_id = ?1 AND season = ?2 AND participant_id = ?3",
        )?;
        let row = stmt
            .query_row(
                params![key.league.as_str(), key.season.0, key.participant.0 as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((txs, balance, gains, losses, watermark, version, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(LedgerSnapshot {
            key: key.clone(),
            transactions: serde_json::from_str(&txs)?,
            balance,
            gains,
            losses,
            last_consolidated_round: Round(watermark as u8),
            version,
            updated_at,
        }))
    }

    /// Single atomic write of the full entry. The balance is recomputed
    /// from the transaction list, written together with it in one SQL
    /// transaction, read back and verified before commit; a mismatch rolls
    /// the write back and leaves the entry untouched.
    fn write_row(
        conn: &mut Connection,
        key: &EntryKey,
        mut transactions: Vec<Transaction>,
        watermark: Round,
        version: i64,
    ) -> Result<LedgerSnapshot, LedgerError> {
        // Stable sort: transactions stay grouped by round, insertion order
        // preserved within a round.
        transactions.sort_by_key(|t| t.round);

        let balance = round_cents(transactions.iter().map(|t| t.value).sum());
        let gains = round_cents(
            transactions
                .iter()
                .filter(|t| t.value > 0.0)
                .map(|t| t.value)
                .sum(),
        );
        let losses = round_cents(
            transactions
                .iter()
                .filter(|t| t.value < 0.0)
                .map(|t| t.value.abs())
                .sum(),
        );
        let payload = serde_json::to_string(&transactions)?;
        let now = Utc::now().timestamp();

        let sql_tx = conn.transaction()?;
        sql_tx.execute(
            "INSERT INTO ledger_entries
                (league_id, season, participant_id, transactions, balance, gains,
                 losses, last_consolidated_round, version, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(league_id, season, participant_id) DO UPDATE SET
                transactions = excluded.transactions,
                balance = excluded.balance,
                gains = excluded.gains,
                losses = excluded.losses,
                last_consolidated_round = excluded.last_consolidated_round,
                version = excluded.version,
                updated_at = excluded.updated_at",
            params![
                key.league.as_str(),
                key.season.0,
                key.participant.0 as i64,
                payload,
                balance,
                gains,
                losses,
                watermark.0 as i64,
                version,
                now,
            ],
        )?;

        // Invariant check against what was actually stored.
        let (stored_txs, stored_balance): (String, f64) = sql_tx.query_row(
            "SELECT transactions, balance FROM ledger_entries
             WHERE league_id = ?1 AND season = ?2 AND participant_id = ?3",
            params![key.league.as_str(), key.season.0, key.participant.0 as i64],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let parsed: Vec<Transaction> = serde_json::from_str(&stored_txs)?;
        let sum = round_cents(parsed.iter().map(|t| t.value).sum());
        if (sum - stored_balance).abs() > 0.005 {
            drop(sql_tx); // rollback
            return Err(LedgerError::InvariantViolation {
                key: key.to_string(),
                balance: stored_balance,
                sum,
            });
        }

        sql_tx.commit()?;

        Ok(LedgerSnapshot {
            key: key.clone(),
            transactions,
            balance,
            gains,
            losses,
            last_consolidated_round: watermark,
            version,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_store() -> (LedgerStore, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let store = LedgerStore::new(temp.path().to_str().unwrap()).unwrap();
        (store, temp)
    }

    fn key() -> EntryKey {
        EntryKey {
            league: LeagueId::parse("test-league").unwrap(),
            season: SeasonYear(2026),
            participant: ParticipantId(42),
        }
    }

    fn tx(round: u8, kind: TransactionKind, value: f64) -> Transaction {
        Transaction::new(Round(round), kind, value, format!("test R{}", round))
    }

    #[tokio::test]
    async fn test_sum_invariant_after_every_operation() {
        let (store, _temp) = test_store();
        let k = key();

        let snap = store
            .upsert_round(
                &k,
                Round(1),
                vec![
                    tx(1, TransactionKind::RankBonus, 10.0),
                    tx(1, TransactionKind::RoundRobin, -5.0),
                ],
            )
            .await
            .unwrap();
        assert_eq!(snap.balance, 5.0);
        assert_eq!(snap.gains, 10.0);
        assert_eq!(snap.losses, 5.0);

        let snap = store
            .append_adjustment(&k, tx(1, TransactionKind::ManualAdjustment, 2.5))
            .await
            .unwrap();
        let sum: f64 = snap.transactions.iter().map(|t| t.value).sum();
        assert_eq!(snap.balance, round_cents(sum));
    }

    #[tokio::test]
    async fn test_upsert_idempotence() {
        let (store, _temp) = test_store();
        let k = key();
        let txs = vec![
            tx(3, TransactionKind::RankBonus, 7.0),
            tx(3, TransactionKind::WeeklyExtreme, 30.0),
        ];

        let first = store.upsert_round(&k, Round(3), txs.clone()).await.unwrap();
        let second = store.upsert_round(&k, Round(3), txs).await.unwrap();

        // Same transactions, same balance, same watermark.
        assert_eq!(first.transactions, second.transactions);
        assert_eq!(first.balance, second.balance);
        assert_eq!(
            first.last_consolidated_round,
            second.last_consolidated_round
        );
    }

    #[tokio::test]
    async fn test_consolidated_round_is_immutable() {
        let (store, _temp) = test_store();
        let k = key();

        store
            .upsert_round(&k, Round(2), vec![tx(2, TransactionKind::RankBonus, 10.0)])
            .await
            .unwrap();
        // Round 5 consolidates; watermark moves past round 2.
        store
            .upsert_round(&k, Round(5), vec![tx(5, TransactionKind::RankBonus, 1.0)])
            .await
            .unwrap();

        // Attempting to rewrite round 2 must not alter it.
        let snap = store
            .upsert_round(&k, Round(2), vec![tx(2, TransactionKind::RankBonus, 999.0)])
            .await
            .unwrap();
        let r2: Vec<&Transaction> = snap
            .transactions
            .iter()
            .filter(|t| t.round == Round(2))
            .collect();
        assert_eq!(r2.len(), 1);
        assert_eq!(r2[0].value, 10.0);
    }

    #[tokio::test]
    async fn test_backfill_of_missed_round_below_watermark() {
        let (store, _temp) = test_store();
        let k = key();

        store
            .upsert_round(&k, Round(5), vec![tx(5, TransactionKind::RankBonus, 1.0)])
            .await
            .unwrap();

        // Round 3 was never written; a one-time backfill is allowed.
        let snap = store
            .upsert_round(&k, Round(3), vec![tx(3, TransactionKind::RoundRobin, 5.0)])
            .await
            .unwrap();
        assert!(snap.transactions.iter().any(|t| t.round == Round(3)));
        assert_eq!(snap.balance, 6.0);
        // Watermark unchanged by the lower round.
        assert_eq!(snap.last_consolidated_round, Round(5));
    }

    #[tokio::test]
    async fn test_repair_replaces_round_wholesale() {
        let (store, _temp) = test_store();
        let k = key();

        store
            .upsert_round(
                &k,
                Round(4),
                vec![
                    tx(4, TransactionKind::RankBonus, 10.0),
                    tx(4, TransactionKind::RoundRobin, 5.0),
                ],
            )
            .await
            .unwrap();

        let snap = store
            .upsert_round(&k, Round(5), vec![tx(5, TransactionKind::RankBonus, 3.0)])
            .await
            .unwrap();
        assert_eq!(snap.last_consolidated_round, Round(5));

        // Round 4 is now below the watermark; only the repair path may
        // rewrite it, and the rewrite replaces wholesale.
        let snap = store
            .repair_replace_round(&k, Round(4), vec![tx(4, TransactionKind::RankBonus, 7.0)])
            .await
            .unwrap();
        let r4: Vec<&Transaction> = snap
            .transactions
            .iter()
            .filter(|t| t.round == Round(4))
            .collect();
        assert_eq!(r4.len(), 1);
        assert_eq!(r4[0].value, 7.0);
    }

    #[tokio::test]
    async fn test_carry_over_updates_not_duplicates() {
        let (store, _temp) = test_store();
        let k = key();

        store.apply_carry_over(&k, 120.0, "carry-over 2025").await.unwrap();
        let snap = store.apply_carry_over(&k, 120.0, "carry-over 2025").await.unwrap();

        let markers: Vec<&Transaction> = snap
            .transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::SeasonCarryOver)
            .collect();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].value, 120.0);
        assert_eq!(snap.balance, 120.0);
    }

    #[tokio::test]
    async fn test_round_zero_rejected_outside_season_path() {
        let (store, _temp) = test_store();
        let k = key();
        let err = store
            .upsert_round(&k, Round(0), vec![tx(0, TransactionKind::RankBonus, 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRound(_)));
    }

    #[tokio::test]
    async fn test_adjustment_kind_enforced() {
        let (store, _temp) = test_store();
        let k = key();
        let err = store
            .append_adjustment(&k, tx(1, TransactionKind::RankBonus, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::KindNotAllowed(_)));
    }

    #[tokio::test]
    async fn test_read_missing_entry() {
        let (store, _temp) = test_store();
        assert!(store.read(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_to_distinct_participants() {
        let (store, _temp) = test_store();
        let mut handles = Vec::new();
        for pid in 1..=8u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let k = EntryKey {
                    league: LeagueId::parse("test-league").unwrap(),
                    season: SeasonYear(2026),
                    participant: ParticipantId(pid),
                };
                store
                    .upsert_round(
                        &k,
                        Round(1),
                        vec![tx(1, TransactionKind::RankBonus, pid as f64)],
                    )
                    .await
                    .unwrap()
            }));
        }
        for (i, h) in handles.into_iter().enumerate() {
            let snap = h.await.unwrap();
            assert_eq!(snap.balance, (i + 1) as f64);
        }
    }

    #[tokio::test]
    async fn test_list_league() {
        let (store, _temp) = test_store();
        let league = LeagueId::parse("test-league").unwrap();
        for pid in [3u64, 1, 2] {
            let k = EntryKey {
                league: league.clone(),
                season: SeasonYear(2026),
                participant: ParticipantId(pid),
            };
            store
                .upsert_round(&k, Round(1), vec![tx(1, TransactionKind::RankBonus, 1.0)])
                .await
                .unwrap();
        }
        let entries = store.list_league(&league, SeasonYear(2026)).await.unwrap();
        let pids: Vec<u64> = entries.iter().map(|e| e.key.participant.0).collect();
        assert_eq!(pids, vec![1, 2, 3]);
    }
}
