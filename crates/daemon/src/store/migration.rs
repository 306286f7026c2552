// Ordered schema migrations tracked through `global_kv`.
//
// Each step runs in its own transaction together with the version bump, so a
// crash mid-migration resumes from the last completed step.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

const VERSION_KEY: &str = "version";

/// One schema step. Versions must be strictly ascending, starting at 1.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub sql: &'static str,
}

pub fn ensure_kv_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS global_kv (
            key     TEXT PRIMARY KEY,
            value   TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure global_kv table exists")
}

pub fn schema_version(conn: &Connection) -> Result<i64> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM global_kv WHERE key = ?1", params![VERSION_KEY], |row| {
            row.get(0)
        })
        .optional()
        .context("failed to read schema version")?;

    match raw {
        Some(value) => value
            .parse()
            .with_context(|| format!("schema version `{value}` is not an integer")),
        None => Ok(0),
    }
}

/// Apply every step newer than the stored version. Returns the final version.
pub fn migrate(conn: &mut Connection, migrations: &[Migration]) -> Result<i64> {
    ensure_kv_table(conn)?;
    validate_order(migrations)?;

    let mut current_version = schema_version(conn)?;
    for migration in migrations {
        if migration.version <= current_version {
            continue;
        }

        let version = migration.version;
        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(migration.sql)
            .with_context(|| format!("failed to apply migration v{version}"))?;
        tx.execute(
            "INSERT INTO global_kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![VERSION_KEY, version.to_string()],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;

        info!(version, "applied schema migration");
        current_version = version;
    }

    Ok(current_version)
}

fn validate_order(migrations: &[Migration]) -> Result<()> {
    let mut previous = 0;
    for migration in migrations {
        if migration.version <= previous {
            bail!(
                "migration v{} is out of order (follows v{previous})",
                migration.version
            );
        }
        previous = migration.version;
    }
    Ok(())
}
