//! League Storage
//! Mission: Persist league definitions with SQLite, keyed by (league, season)
//!
//! Config and roster are stored as one JSON document per row; the owner
//! column is denormalized so tenant filtering never parses JSON.

use crate::models::{League, LeagueId, SeasonYear};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

/// League storage with SQLite backend
pub struct LeagueStore {
    db_path: String,
}

impl LeagueStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS leagues (
                league_id TEXT NOT NULL,
                season INTEGER NOT NULL,
                owner TEXT NOT NULL,
                definition TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (league_id, season)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_leagues_owner ON leagues(owner)",
            [],
        )?;

        Ok(())
    }

    /// Insert or replace a league definition.
    pub fn upsert(&self, league: &League) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;
        let definition =
            serde_json::to_string(league).context("Failed to serialize league definition")?;

        conn.execute(
            "INSERT INTO leagues (league_id, season, owner, definition, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(league_id, season) DO UPDATE SET
                owner = excluded.owner,
                definition = excluded.definition,
                updated_at = excluded.updated_at",
            params![
                league.id.as_str(),
                league.season.0,
                league.owner,
                definition,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to upsert league")?;

        info!("✅ Saved league: {} season {}", league.id, league.season);
        Ok(())
    }

    pub fn get(&self, id: &LeagueId, season: SeasonYear) -> Result<Option<League>> {
        let conn = Connection::open(&self.db_path)?;
        let definition: Option<String> = conn
            .query_row(
                "SELECT definition FROM leagues WHERE league_id = ?1 AND season = ?2",
                params![id.as_str(), season.0],
                |row| row.get(0),
            )
            .optional()?;

        match definition {
            Some(json) => {
                let league =
                    serde_json::from_str(&json).context("Failed to parse league definition")?;
                Ok(Some(league))
            }
            None => Ok(None),
        }
    }

    /// All leagues, every tenant. Scheduler and super-admin use only.
    pub fn list_all(&self) -> Result<Vec<League>> {
        self.list_where("SELECT definition FROM leagues ORDER BY league_id, season", &[])
    }

    /// Leagues owned by one administrator.
    pub fn list_owned(&self, owner: &str) -> Result<Vec<League>> {
        self.list_where(
            "SELECT definition FROM leagues WHERE owner = ?1 ORDER BY league_id, season",
            &[&owner],
        )
    }

    fn list_where(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<League>> {
        let conn = Connection::open(&self.db_path)?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|json| {
                serde_json::from_str(json).context("Failed to parse league definition")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeagueConfig, ParticipantId, RosterEntry, SeasonConfig};
    use tempfile::NamedTempFile;

    fn create_test_store() -> (LeagueStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = LeagueStore::new(temp_file.path().to_str().unwrap()).unwrap();
        (store, temp_file)
    }

    fn league(slug: &str, owner: &str) -> League {
        League {
            id: LeagueId::parse(slug).unwrap(),
            name: slug.to_uppercase(),
            owner: owner.to_string(),
            season: SeasonYear(2026),
            config: LeagueConfig::default(),
            season_rules: SeasonConfig::default(),
            roster: vec![RosterEntry {
                id: ParticipantId(1),
                name: "solo".to_string(),
                withdrawn_at: None,
            }],
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let (store, _temp) = create_test_store();
        store.upsert(&league("alpha", "ana")).unwrap();

        let loaded = store
            .get(&LeagueId::parse("alpha").unwrap(), SeasonYear(2026))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name, "ALPHA");
        assert_eq!(loaded.roster.len(), 1);

        // Replace on conflict
        let mut updated = league("alpha", "ana");
        updated.name = "Alpha Prime".to_string();
        store.upsert(&updated).unwrap();
        let loaded = store
            .get(&LeagueId::parse("alpha").unwrap(), SeasonYear(2026))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name, "Alpha Prime");
    }

    #[test]
    fn test_get_missing() {
        let (store, _temp) = create_test_store();
        assert!(store
            .get(&LeagueId::parse("ghost").unwrap(), SeasonYear(2026))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_owned_filters_by_tenant() {
        let (store, _temp) = create_test_store();
        store.upsert(&league("alpha", "ana")).unwrap();
        store.upsert(&league("beta", "bruno")).unwrap();
        store.upsert(&league("gamma", "ana")).unwrap();

        let ana = store.list_owned("ana").unwrap();
        assert_eq!(ana.len(), 2);
        assert!(ana.iter().all(|l| l.owner == "ana"));

        assert_eq!(store.list_all().unwrap().len(), 3);
    }
}
