// `blob_storage` table access. Blobs are owned by a document and die with it.

use anyhow::{Context, Result};
use quire_common::ids;
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    pub id: String,
    pub content: Vec<u8>,
    pub size: i64,
    pub owner_id: String,
    pub created_at: i64,
    pub accessed_at: i64,
    pub modified_at: i64,
}

pub struct BlobStore;

impl BlobStore {
    /// Store `content` for `owner_id`; returns the new blob id.
    pub fn insert(conn: &Connection, owner_id: &str, content: &[u8], now: i64) -> Result<String> {
        let id = ids::mk_blob_id();
        conn.execute(
            "INSERT INTO blob_storage \
             (id, content, size, owner_id, created_at, accessed_at, modified_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5)",
            params![id, content, content.len() as i64, owner_id, now],
        )
        .with_context(|| format!("failed to store blob for owner `{owner_id}`"))?;
        Ok(id)
    }

    /// Fetch a blob and bump its `accessed_at`.
    pub fn get(conn: &Connection, id: &str, now: i64) -> Result<Option<BlobRecord>> {
        let record = conn
            .query_row(
                "SELECT id, content, size, owner_id, created_at, accessed_at, modified_at \
                 FROM blob_storage WHERE id = ?1",
                params![id],
                |row| {
                    Ok(BlobRecord {
                        id: row.get(0)?,
                        content: row.get(1)?,
                        size: row.get(2)?,
                        owner_id: row.get(3)?,
                        created_at: row.get(4)?,
                        accessed_at: row.get(5)?,
                        modified_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("failed to query blob `{id}`"))?;

        if record.is_some() {
            conn.execute("UPDATE blob_storage SET accessed_at = ?1 WHERE id = ?2", params![now, id])
                .with_context(|| format!("failed to update accessed_at of blob `{id}`"))?;
        }
        Ok(record)
    }

    pub fn delete_by_owner(conn: &Connection, owner_id: &str) -> Result<usize> {
        conn.execute("DELETE FROM blob_storage WHERE owner_id = ?1", params![owner_id])
            .with_context(|| format!("failed to delete blobs of owner `{owner_id}`"))
    }
}
