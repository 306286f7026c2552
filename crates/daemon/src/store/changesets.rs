// `changeset` table access: the per-document append log between snapshots.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

/// A row in the `changeset` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesetRecord {
    pub id: String,
    /// Document version produced by this changeset; strictly increasing per document.
    pub version_num: i64,
    pub document_id: String,
    /// Serialized changeset payload.
    pub content: String,
    pub created_at: i64,
}

pub struct ChangesetStore;

impl ChangesetStore {
    pub fn insert(conn: &Connection, record: &ChangesetRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO changeset (id, version_num, document_id, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.version_num,
                record.document_id,
                record.content,
                record.created_at,
            ],
        )
        .with_context(|| {
            format!(
                "failed to insert changeset v{} for document `{}`",
                record.version_num, record.document_id
            )
        })?;
        Ok(())
    }

    /// All changesets of a document in replay order.
    pub fn list_for_document(conn: &Connection, document_id: &str) -> Result<Vec<ChangesetRecord>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, version_num, document_id, content, created_at \
                 FROM changeset \
                 WHERE document_id = ?1 \
                 ORDER BY version_num ASC",
            )
            .context("failed to prepare changeset by document query")?;

        let rows = stmt
            .query_map(params![document_id], row_to_record)
            .context("failed to query changesets by document")?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to collect changeset rows")
    }

    pub fn count_for_document(conn: &Connection, document_id: &str) -> Result<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM changeset WHERE document_id = ?1",
            params![document_id],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to count changesets of document `{document_id}`"))
    }

    /// Delete the rows folded into a snapshot taken at `version`. Rows for
    /// later versions survive.
    pub fn delete_through(conn: &Connection, document_id: &str, version: i64) -> Result<usize> {
        conn.execute(
            "DELETE FROM changeset WHERE document_id = ?1 AND version_num <= ?2",
            params![document_id, version],
        )
        .with_context(|| {
            format!("failed to delete changesets through v{version} of document `{document_id}`")
        })
    }

    pub fn delete_for_document(conn: &Connection, document_id: &str) -> Result<usize> {
        conn.execute("DELETE FROM changeset WHERE document_id = ?1", params![document_id])
            .with_context(|| format!("failed to delete changesets of document `{document_id}`"))
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangesetRecord> {
    Ok(ChangesetRecord {
        id: row.get(0)?,
        version_num: row.get(1)?,
        document_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}
