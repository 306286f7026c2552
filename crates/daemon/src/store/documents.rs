// `document` table access.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

const SELECT_COLUMNS: &str = "SELECT id, title, snapshot, snapshot_version, trashed_at, \
                                     accessed_at, created_at, modified_at \
                              FROM document";

/// A row in the `document` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    /// Serialized content tree as of `snapshot_version`; `None` until first compaction
    /// of a document created without one.
    pub snapshot: Option<String>,
    pub snapshot_version: i64,
    pub trashed_at: Option<i64>,
    pub accessed_at: i64,
    pub created_at: i64,
    pub modified_at: i64,
}

impl DocumentRecord {
    pub fn is_trashed(&self) -> bool {
        self.trashed_at.is_some()
    }
}

pub struct DocumentStore;

impl DocumentStore {
    pub fn insert(conn: &Connection, record: &DocumentRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO document \
             (id, title, snapshot, snapshot_version, trashed_at, accessed_at, created_at, modified_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.title,
                record.snapshot,
                record.snapshot_version,
                record.trashed_at,
                record.accessed_at,
                record.created_at,
                record.modified_at,
            ],
        )
        .with_context(|| format!("failed to insert document `{}`", record.id))?;
        Ok(())
    }

    /// Fetch a row regardless of trash state.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<DocumentRecord>> {
        conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], row_to_record)
            .optional()
            .with_context(|| format!("failed to query document `{id}`"))
    }

    /// Fetch a row only if it is not in the trash.
    pub fn get_active(conn: &Connection, id: &str) -> Result<Option<DocumentRecord>> {
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1 AND trashed_at IS NULL"),
            params![id],
            row_to_record,
        )
        .optional()
        .with_context(|| format!("failed to query active document `{id}`"))
    }

    pub fn active_title(conn: &Connection, id: &str) -> Result<Option<String>> {
        conn.query_row(
            "SELECT title FROM document WHERE id = ?1 AND trashed_at IS NULL",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed to query title of document `{id}`"))
    }

    pub fn update_after_edit(
        conn: &Connection,
        id: &str,
        title: &str,
        modified_at: i64,
    ) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE document SET title = ?1, modified_at = ?2 WHERE id = ?3",
                params![title, modified_at, id],
            )
            .with_context(|| format!("failed to update document `{id}` after edit"))?;
        Ok(changed > 0)
    }

    pub fn touch_accessed(conn: &Connection, id: &str, accessed_at: i64) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE document SET accessed_at = ?1 WHERE id = ?2",
                params![accessed_at, id],
            )
            .with_context(|| format!("failed to update accessed_at of document `{id}`"))?;
        Ok(changed > 0)
    }

    pub fn write_snapshot(
        conn: &Connection,
        id: &str,
        snapshot: &str,
        snapshot_version: i64,
    ) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE document SET snapshot = ?1, snapshot_version = ?2 WHERE id = ?3",
                params![snapshot, snapshot_version, id],
            )
            .with_context(|| format!("failed to write snapshot of document `{id}`"))?;
        Ok(changed > 0)
    }

    /// Mark a row trashed. A row already in the trash keeps its original
    /// `trashed_at`; returns whether the row changed.
    pub fn set_trashed(conn: &Connection, id: &str, trashed_at: i64) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE document SET trashed_at = ?1 WHERE id = ?2 AND trashed_at IS NULL",
                params![trashed_at, id],
            )
            .with_context(|| format!("failed to move document `{id}` to trash"))?;
        Ok(changed > 0)
    }

    /// Clear the trash marker; returns whether the row changed.
    pub fn clear_trashed(conn: &Connection, id: &str) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE document SET trashed_at = NULL WHERE id = ?1 AND trashed_at IS NOT NULL",
                params![id],
            )
            .with_context(|| format!("failed to recover document `{id}`"))?;
        Ok(changed > 0)
    }

    pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let changed = conn
            .execute("DELETE FROM document WHERE id = ?1", params![id])
            .with_context(|| format!("failed to delete document `{id}`"))?;
        Ok(changed > 0)
    }

    /// Every non-trashed row, oldest first.
    pub fn list_active(conn: &Connection) -> Result<Vec<DocumentRecord>> {
        query_records(
            conn,
            &format!("{SELECT_COLUMNS} WHERE trashed_at IS NULL ORDER BY created_at ASC, id ASC"),
            params![],
        )
    }

    /// Non-trashed rows, most recently modified first.
    pub fn list_recent(conn: &Connection, limit: usize) -> Result<Vec<DocumentRecord>> {
        query_records(
            conn,
            &format!(
                "{SELECT_COLUMNS} WHERE trashed_at IS NULL \
                 ORDER BY modified_at DESC, id ASC LIMIT ?1"
            ),
            params![limit as i64],
        )
    }

    /// Trashed rows, most recently trashed first.
    pub fn list_trashed(conn: &Connection) -> Result<Vec<DocumentRecord>> {
        query_records(
            conn,
            &format!(
                "{SELECT_COLUMNS} WHERE trashed_at IS NOT NULL ORDER BY trashed_at DESC, id ASC"
            ),
            params![],
        )
    }
}

fn query_records(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<DocumentRecord>> {
    let mut stmt = conn.prepare(sql).context("failed to prepare document list query")?;
    let rows = stmt.query_map(params, row_to_record).context("failed to query documents")?;
    rows.collect::<std::result::Result<Vec<_>, _>>().context("failed to collect document rows")
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        snapshot: row.get(2)?,
        snapshot_version: row.get(3)?,
        trashed_at: row.get(4)?,
        accessed_at: row.get(5)?,
        created_at: row.get(6)?,
        modified_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::store::notebook_db::NotebookDb;

    fn record(id: &str, title: &str, at: i64) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            title: title.to_string(),
            snapshot: None,
            snapshot_version: 0,
            trashed_at: None,
            accessed_at: at,
            created_at: at,
            modified_at: at,
        }
    }

    fn open_db(tmp: &TempDir) -> NotebookDb {
        NotebookDb::open(tmp.path().join("notebook.db")).expect("notebook should open")
    }

    #[test]
    fn insert_then_get_round_trips() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let conn = db.connection();

        let doc = record("Doc-a", "Alpha", 10);
        DocumentStore::insert(conn, &doc).expect("insert should succeed");

        assert_eq!(DocumentStore::get(conn, "Doc-a").unwrap(), Some(doc.clone()));
        assert_eq!(DocumentStore::get_active(conn, "Doc-a").unwrap(), Some(doc));
        assert_eq!(DocumentStore::get(conn, "Doc-missing").unwrap(), None);
    }

    #[test]
    fn trash_keeps_first_timestamp_and_hides_from_active_queries() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let conn = db.connection();
        DocumentStore::insert(conn, &record("Doc-a", "Alpha", 10)).unwrap();

        assert!(DocumentStore::set_trashed(conn, "Doc-a", 100).unwrap());
        assert!(!DocumentStore::set_trashed(conn, "Doc-a", 200).unwrap());

        let stored = DocumentStore::get(conn, "Doc-a").unwrap().unwrap();
        assert_eq!(stored.trashed_at, Some(100));
        assert_eq!(DocumentStore::get_active(conn, "Doc-a").unwrap(), None);
        assert_eq!(DocumentStore::active_title(conn, "Doc-a").unwrap(), None);
        assert!(DocumentStore::list_active(conn).unwrap().is_empty());
        assert_eq!(DocumentStore::list_trashed(conn).unwrap().len(), 1);

        assert!(DocumentStore::clear_trashed(conn, "Doc-a").unwrap());
        assert!(!DocumentStore::clear_trashed(conn, "Doc-a").unwrap());
        assert_eq!(DocumentStore::active_title(conn, "Doc-a").unwrap().as_deref(), Some("Alpha"));
    }

    #[test]
    fn recent_orders_by_modified_desc_and_limits() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let conn = db.connection();
        for (index, id) in ["Doc-a", "Doc-b", "Doc-c"].iter().enumerate() {
            DocumentStore::insert(conn, &record(id, id, index as i64)).unwrap();
        }
        DocumentStore::update_after_edit(conn, "Doc-a", "Alpha", 50).unwrap();

        let recent: Vec<String> = DocumentStore::list_recent(conn, 2)
            .unwrap()
            .into_iter()
            .map(|record| record.id)
            .collect();
        assert_eq!(recent, vec!["Doc-a".to_string(), "Doc-c".to_string()]);
    }

    #[test]
    fn snapshot_write_updates_version() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp);
        let conn = db.connection();
        DocumentStore::insert(conn, &record("Doc-a", "", 1)).unwrap();

        assert!(DocumentStore::write_snapshot(conn, "Doc-a", "{}", 7).unwrap());
        assert!(!DocumentStore::write_snapshot(conn, "Doc-gone", "{}", 7).unwrap());

        let stored = DocumentStore::get(conn, "Doc-a").unwrap().unwrap();
        assert_eq!(stored.snapshot.as_deref(), Some("{}"));
        assert_eq!(stored.snapshot_version, 7);
    }
}
