// Application-level store, separate from any notebook: remembers which
// notebooks were opened recently.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::migration::{self, Migration};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE recent_notebooks (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    local_path          TEXT NOT NULL UNIQUE,
    last_opened_at      INTEGER NOT NULL
);
"#;

const APP_MIGRATIONS: &[Migration] = &[Migration { version: 1, sql: MIGRATION_V1_SQL }];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentNotebook {
    pub id: i64,
    pub local_path: String,
    pub last_opened_at: i64,
}

#[derive(Debug)]
pub struct AppDb {
    conn: Connection,
}

impl AppDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create app db parent directory `{}`", parent.display())
            })?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("failed to open app db at `{}`", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .context("failed to configure sqlite pragmas for app db")?;
        migration::migrate(&mut conn, APP_MIGRATIONS).context("failed to migrate app db")?;

        Ok(Self { conn })
    }

    /// Remember that `local_path` was opened at `opened_at`.
    pub fn record_opened(&self, local_path: &str, opened_at: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO recent_notebooks (local_path, last_opened_at) VALUES (?1, ?2)
                 ON CONFLICT(local_path) DO UPDATE SET last_opened_at = excluded.last_opened_at",
                params![local_path, opened_at],
            )
            .with_context(|| format!("failed to record recent notebook `{local_path}`"))?;
        Ok(())
    }

    /// Most recently opened first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<RecentNotebook>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, local_path, last_opened_at FROM recent_notebooks \
                 ORDER BY last_opened_at DESC, id DESC LIMIT ?1",
            )
            .context("failed to prepare recent notebooks query")?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RecentNotebook {
                    id: row.get(0)?,
                    local_path: row.get(1)?,
                    last_opened_at: row.get(2)?,
                })
            })
            .context("failed to query recent notebooks")?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to collect recent notebook rows")
    }
}
