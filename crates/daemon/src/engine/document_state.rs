// In-memory state of one open document: the content tree rebuilt from its
// snapshot plus replayed changesets.

use anyhow::{anyhow, Context};
use quire_common::content::{Changeset, ContentState, Document, RejectReason};
use quire_common::outline::OutlineNode;
use quire_common::types::OpenDocumentResponse;
use rusqlite::Connection;
use tracing::debug;

use super::outline::{generate_outline, TitleLookup};
use crate::error::DocumentError;
use crate::store::{ChangesetStore, DocumentRecord, DocumentStore};

/// Result of offering a changeset to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { title_changed: bool },
    /// The content engine refused the changeset; nothing changed.
    Rejected(RejectReason),
}

/// Everything `apply_changeset` may change, captured for rollback.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    content: ContentState,
    title: String,
    modified_at: i64,
    changeset_counter: u32,
}

#[derive(Debug)]
pub struct DocumentState {
    id: String,
    content: ContentState,
    title: String,
    accessed_at: i64,
    created_at: i64,
    modified_at: i64,
    /// Changesets applied since the last snapshot, replayed ones included.
    changeset_counter: u32,
    compaction_pending: bool,
}

impl DocumentState {
    /// Rebuild a non-trashed document from storage without touching it.
    pub fn load(conn: &Connection, id: &str) -> Result<Self, DocumentError> {
        let record =
            DocumentStore::get_active(conn, id)?.ok_or_else(|| DocumentError::not_found(id))?;
        Self::from_record(conn, record)
    }

    /// Rebuild from an already fetched row, replaying its changeset log.
    pub fn from_record(conn: &Connection, record: DocumentRecord) -> Result<Self, DocumentError> {
        let document = match record.snapshot.as_deref() {
            Some(raw) => Document::from_json(raw)
                .with_context(|| format!("failed to decode snapshot of document `{}`", record.id))?,
            None => Document::new(),
        };
        let mut content = ContentState::new(document, record.snapshot_version);

        let mut replayed = 0u32;
        for row in ChangesetStore::list_for_document(conn, &record.id)? {
            if row.version_num <= record.snapshot_version {
                // Already folded into the snapshot.
                continue;
            }
            let changeset = Changeset::from_json(&row.content).with_context(|| {
                format!("failed to decode changeset `{}` of document `{}`", row.id, record.id)
            })?;
            content.apply(&changeset).map_err(|reason| {
                anyhow!(
                    "stored changeset `{}` of document `{}` does not replay: {reason}",
                    row.id,
                    record.id
                )
            })?;
            replayed += 1;
        }

        debug!(doc_id = %record.id, replayed, version = content.applied_version(), "loaded document");

        let title = content.document().title_text();
        Ok(Self {
            id: record.id,
            content,
            title,
            accessed_at: record.accessed_at,
            created_at: record.created_at,
            modified_at: record.modified_at,
            changeset_counter: replayed,
            compaction_pending: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Title derived from the content tree; may be empty.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn document(&self) -> &Document {
        self.content.document()
    }

    pub fn applied_version(&self) -> i64 {
        self.content.applied_version()
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn modified_at(&self) -> i64 {
        self.modified_at
    }

    pub fn accessed_at(&self) -> i64 {
        self.accessed_at
    }

    pub fn set_accessed_at(&mut self, at: i64) {
        self.accessed_at = at;
    }

    pub fn set_modified_at(&mut self, at: i64) {
        self.modified_at = at;
    }

    pub fn changeset_counter(&self) -> u32 {
        self.changeset_counter
    }

    pub fn compaction_pending(&self) -> bool {
        self.compaction_pending
    }

    pub fn set_compaction_pending(&mut self, pending: bool) {
        self.compaction_pending = pending;
    }

    /// Called once a snapshot at the current version is durable.
    pub fn mark_compacted(&mut self) {
        self.changeset_counter = 0;
        self.compaction_pending = false;
    }

    pub fn apply_changeset(&mut self, changeset: &Changeset) -> ApplyOutcome {
        if let Err(reason) = self.content.apply(changeset) {
            return ApplyOutcome::Rejected(reason);
        }

        let title = self.content.document().title_text();
        let title_changed = title != self.title;
        self.title = title;
        self.changeset_counter = self.changeset_counter.saturating_add(1);
        ApplyOutcome::Applied { title_changed }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            content: self.content.clone(),
            title: self.title.clone(),
            modified_at: self.modified_at,
            changeset_counter: self.changeset_counter,
        }
    }

    /// Undo everything applied since `checkpoint` was taken.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.content = checkpoint.content;
        self.title = checkpoint.title;
        self.modified_at = checkpoint.modified_at;
        self.changeset_counter = checkpoint.changeset_counter;
    }

    pub fn generate_response(&self) -> OpenDocumentResponse {
        OpenDocumentResponse {
            id: self.id.clone(),
            snapshot: self.content.document().clone(),
            snapshot_version: self.content.applied_version(),
            accessed_at: self.accessed_at,
            created_at: self.created_at,
            modified_at: self.modified_at,
        }
    }

    pub fn generate_outline(
        &self,
        titles: &dyn TitleLookup,
        collector: Option<&mut Vec<String>>,
    ) -> OutlineNode {
        generate_outline(self.content.document(), titles, collector)
    }
}

#[cfg(test)]
mod tests {
    use quire_common::content::{Operation, TextTarget};
    use tempfile::TempDir;

    use super::*;
    use crate::store::{ChangesetRecord, NotebookDb};

    fn title_insert(version: i64, index: usize, text: &str) -> Changeset {
        Changeset::new(version).with_operation(Operation::InsertText {
            target: TextTarget::Title,
            index,
            text: text.into(),
        })
    }

    fn seed(conn: &Connection, id: &str, snapshot: Option<&Document>, version: i64) {
        DocumentStore::insert(
            conn,
            &DocumentRecord {
                id: id.to_string(),
                title: String::new(),
                snapshot: snapshot.map(|doc| doc.to_json().unwrap()),
                snapshot_version: version,
                trashed_at: None,
                accessed_at: 1,
                created_at: 1,
                modified_at: 1,
            },
        )
        .unwrap();
    }

    fn log(conn: &Connection, id: &str, changeset: &Changeset) {
        ChangesetStore::insert(
            conn,
            &ChangesetRecord {
                id: format!("Chs-{}", changeset.version),
                version_num: changeset.version,
                document_id: id.to_string(),
                content: changeset.to_json().unwrap(),
                created_at: 2,
            },
        )
        .unwrap();
    }

    #[test]
    fn load_replays_changesets_on_top_of_snapshot() {
        let tmp = TempDir::new().unwrap();
        let db = NotebookDb::open(tmp.path().join("notebook.db")).unwrap();
        let conn = db.connection();

        seed(conn, "Doc-a", Some(&Document::with_title("Meet")), 3);
        log(conn, "Doc-a", &title_insert(3, 0, "stale "));
        log(conn, "Doc-a", &title_insert(4, 4, "ing"));
        log(conn, "Doc-a", &title_insert(5, 7, " Notes"));

        let state = DocumentState::load(conn, "Doc-a").expect("document should load");
        assert_eq!(state.title(), "Meeting Notes");
        assert_eq!(state.applied_version(), 5);
        assert_eq!(state.changeset_counter(), 2);
    }

    #[test]
    fn missing_snapshot_starts_from_empty_tree() {
        let tmp = TempDir::new().unwrap();
        let db = NotebookDb::open(tmp.path().join("notebook.db")).unwrap();
        seed(db.connection(), "Doc-a", None, 0);

        let state = DocumentState::load(db.connection(), "Doc-a").unwrap();
        assert_eq!(state.document(), &Document::new());
        assert_eq!(state.applied_version(), 0);
    }

    #[test]
    fn trashed_or_missing_documents_are_not_found() {
        let tmp = TempDir::new().unwrap();
        let db = NotebookDb::open(tmp.path().join("notebook.db")).unwrap();
        let conn = db.connection();
        seed(conn, "Doc-a", None, 0);
        DocumentStore::set_trashed(conn, "Doc-a", 9).unwrap();

        assert!(matches!(
            DocumentState::load(conn, "Doc-a"),
            Err(DocumentError::NotFound { .. })
        ));
        assert!(matches!(
            DocumentState::load(conn, "Doc-nope"),
            Err(DocumentError::NotFound { .. })
        ));
    }

    #[test]
    fn corrupt_log_fails_the_load() {
        let tmp = TempDir::new().unwrap();
        let db = NotebookDb::open(tmp.path().join("notebook.db")).unwrap();
        let conn = db.connection();
        seed(conn, "Doc-a", None, 0);
        log(conn, "Doc-a", &title_insert(2, 0, "gap"));

        assert!(matches!(DocumentState::load(conn, "Doc-a"), Err(DocumentError::Storage(_))));
    }

    #[test]
    fn apply_reports_title_changes_and_rejections() {
        let tmp = TempDir::new().unwrap();
        let db = NotebookDb::open(tmp.path().join("notebook.db")).unwrap();
        seed(db.connection(), "Doc-a", None, 0);
        let mut state = DocumentState::load(db.connection(), "Doc-a").unwrap();

        assert_eq!(
            state.apply_changeset(&title_insert(1, 0, "Home")),
            ApplyOutcome::Applied { title_changed: true }
        );
        assert_eq!(
            state.apply_changeset(&title_insert(1, 0, "again")),
            ApplyOutcome::Rejected(RejectReason::StaleVersion { version: 1, applied: 1 })
        );
        assert_eq!(state.changeset_counter(), 1);

        let body_edit = Changeset::new(2).with_operation(Operation::InsertBlock {
            after: None,
            block: quire_common::content::Block::with_id(
                "Blk-1",
                quire_common::content::TextType::Normal,
                quire_common::content::Delta::from_text("body"),
            ),
        });
        assert_eq!(state.apply_changeset(&body_edit), ApplyOutcome::Applied { title_changed: false });
        assert_eq!(state.generate_response().snapshot_version, 2);
    }

    #[test]
    fn rollback_restores_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let db = NotebookDb::open(tmp.path().join("notebook.db")).unwrap();
        seed(db.connection(), "Doc-a", Some(&Document::with_title("Keep")), 0);
        let mut state = DocumentState::load(db.connection(), "Doc-a").unwrap();

        let checkpoint = state.checkpoint();
        state.apply_changeset(&title_insert(1, 0, "Lose "));
        state.set_modified_at(99);
        state.rollback(checkpoint);

        assert_eq!(state.title(), "Keep");
        assert_eq!(state.applied_version(), 0);
        assert_eq!(state.changeset_counter(), 0);
        assert_eq!(state.modified_at(), 1);
    }
}
