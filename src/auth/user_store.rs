//! Administrator Storage
//! Mission: Securely store league administrator accounts with SQLite

use crate::auth::models::{User, UserRole};
use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{info, warn};
use uuid::Uuid;

/// Administrator storage with SQLite backend
pub struct UserStore {
    db_path: String,
}

impl UserStore {
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
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        self.create_default_super_admin(&conn)?;

        Ok(())
    }

    /// Create default super-admin for initial setup
    fn create_default_super_admin(&self, conn: &Connection) -> Result<()> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE role = 'super_admin'",
                [],
                |row| row.get(0),
            )
            .context("Failed to check for super-admin users")?;

        if count == 0 {
            let password_hash =
                hash("admin123", DEFAULT_COST).context("Failed to hash password")?;

            let admin = User {
                id: Uuid::new_v4(),
                username: "admin".to_string(),
                password_hash,
                role: UserRole::SuperAdmin,
                created_at: Utc::now().to_rfc3339(),
            };

            conn.execute(
                "INSERT INTO users (id, username, password_hash, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    admin.id.to_string(),
                    admin.username,
                    admin.password_hash,
                    admin.role.as_str(),
                    admin.created_at,
                ],
            )
            .context("Failed to insert super-admin user")?;

            info!("🔐 Default super-admin created (username: admin, password: admin123)");
            warn!("⚠️  CHANGE DEFAULT PASSWORD IN PRODUCTION!");
        }

        Ok(())
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, role, created_at
             FROM users WHERE username = ?1",
        )?;

        let user_result = stmt.query_row(params![username], |row| {
            let role_str: String = row.get(3)?;
            Ok(User {
                id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                username: row.get(1)?,
                password_hash: row.get(2)?,
                role: UserRole::from_str(&role_str).unwrap_or(UserRole::Admin),
                created_at: row.get(4)?,
            })
        });

        match user_result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify username and password
    pub fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        match self.get_user_by_username(username)? {
            Some(user) => {
                let valid =
                    verify(password, &user.password_hash).context("Failed to verify password")?;
                Ok(valid)
            }
            None => Ok(false),
        }
    }

    /// Create a new administrator
    pub fn create_user(&self, username: &str, password: &str, role: UserRole) -> Result<User> {
        let password_hash = hash(password, DEFAULT_COST).context("Failed to hash password")?;

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            role,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO users (id, username, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.to_string(),
                user.username,
                user.password_hash,
                user.role.as_str(),
                user.created_at,
            ],
        )
        .context("Failed to insert user")?;

        info!("✅ Created admin: {} ({})", user.username, user.role.as_str());

        Ok(user)
    }
}
