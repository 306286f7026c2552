use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;

use super::migration::{self, Migration};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE document (
    id                  TEXT PRIMARY KEY,
    title               TEXT NOT NULL DEFAULT '',
    snapshot            TEXT NULL,
    snapshot_version    INTEGER NOT NULL DEFAULT 0,
    trashed_at          INTEGER NULL,
    accessed_at         INTEGER NOT NULL,
    created_at          INTEGER NOT NULL,
    modified_at         INTEGER NOT NULL
);

CREATE TABLE changeset (
    id                  TEXT PRIMARY KEY,
    version_num         INTEGER NOT NULL,
    document_id         TEXT NOT NULL,
    content             TEXT NOT NULL,
    created_at          INTEGER NOT NULL
);

CREATE TABLE blob_storage (
    id                  TEXT PRIMARY KEY,
    content             BLOB NOT NULL,
    size                INTEGER NOT NULL,
    owner_id            TEXT NOT NULL,
    created_at          INTEGER NOT NULL,
    accessed_at         INTEGER NOT NULL,
    modified_at         INTEGER NOT NULL
);
"#;

const MIGRATION_V2_SQL: &str = r#"
CREATE INDEX idx_changeset_document
    ON changeset (document_id, version_num);

CREATE INDEX idx_blob_storage_owner
    ON blob_storage (owner_id);

CREATE INDEX idx_document_modified
    ON document (modified_at);
"#;

pub const NOTEBOOK_MIGRATIONS: &[Migration] = &[
    Migration { version: 1, sql: MIGRATION_V1_SQL },
    Migration { version: 2, sql: MIGRATION_V2_SQL },
];

/// The single handle to one notebook file. Shared as [`SharedNotebookDb`].
#[derive(Debug)]
pub struct NotebookDb {
    conn: Connection,
}

pub type SharedNotebookDb = Arc<Mutex<NotebookDb>>;

impl NotebookDb {
    /// Open (creating if needed) and migrate a notebook database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create notebook parent directory `{}`", parent.display())
            })?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("failed to open notebook at `{}`", path.display()))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )
        .context("failed to configure sqlite pragmas for notebook")?;

        migration::migrate(&mut conn, NOTEBOOK_MIGRATIONS)
            .with_context(|| format!("failed to migrate notebook `{}`", path.display()))?;

        Ok(Self { conn })
    }

    pub fn into_shared(self) -> SharedNotebookDb {
        Arc::new(Mutex::new(self))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn schema_version(&self) -> Result<i64> {
        migration::schema_version(&self.conn)
    }
}

/// Lock the shared handle, turning a poisoned lock into an error.
pub fn lock_db(db: &SharedNotebookDb) -> Result<MutexGuard<'_, NotebookDb>> {
    db.lock().map_err(|_| anyhow!("notebook database lock poisoned"))
}
