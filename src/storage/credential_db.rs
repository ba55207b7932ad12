use rusqlite::{OptionalExtension, Result as SqlResult, params};
use std::path::Path;

use super::database::Database;
use super::models::StoredCredential;
use crate::common::{User, UserId};

/// Single-row store for the bearer token of the signed-in user.
pub struct CredentialDatabase {
    db: Database,
}

impl CredentialDatabase {
    pub fn with_path<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        Self::init(Database::open(path)?)
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::init(Database::in_memory()?)
    }

    fn init(db: Database) -> SqlResult<Self> {
        let store = Self { db };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> SqlResult<()> {
        self.db.connection().execute(
            "CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                token TEXT NOT NULL,
                user_id TEXT NOT NULL,
                username TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                img TEXT,
                saved_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )",
            [],
        )?;
        Ok(())
    }

    /// Replaces whatever credential was stored before.
    pub fn save(&self, token: &str, user: &User) -> SqlResult<()> {
        self.db.connection().execute(
            "INSERT OR REPLACE INTO credentials (id, token, user_id, username, name, img, saved_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, strftime('%s', 'now'))",
            params![token, user.id.as_str(), user.username, user.name, user.img],
        )?;
        Ok(())
    }

    pub fn load(&self) -> SqlResult<Option<StoredCredential>> {
        self.db
            .connection()
            .query_row(
                "SELECT token, user_id, username, name, img, saved_at FROM credentials WHERE id = 1",
                [],
                |row| {
                    Ok(StoredCredential {
                        token: row.get(0)?,
                        user: User {
                            id: UserId::new(row.get::<_, String>(1)?),
                            username: row.get(2)?,
                            name: row.get(3)?,
                            img: row.get(4)?,
                        },
                        saved_at: row.get(5)?,
                    })
                },
            )
            .optional()
    }

    pub fn clear(&self) -> SqlResult<()> {
        self.db
            .connection()
            .execute("DELETE FROM credentials", [])?;
        Ok(())
    }
}
