// Reference-counted registry of open documents.
//
// Every consumer of a document id shares one `DocumentState`. Loads go through
// a per-entry `OnceCell`, so concurrent opens of the same id hit storage once.
// Every open hands out a `DocumentLease` tagged with the entry's generation;
// closing a lease whose entry was evicted (by trash) leaves later entries alone.
// Lock order: document state first, then the notebook database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Context};
use quire_common::content::{Changeset, Document, RejectReason};
use quire_common::ids::{mk_changeset_id, HOME_DOCUMENT_ID};
use quire_common::outline::OutlineNode;
use quire_common::types::SearchItem;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::document_state::{ApplyOutcome, DocumentState};
use super::outline::StoredTitles;
use crate::clock::Clock;
use crate::error::DocumentError;
use crate::search::SearchIndex;
use crate::store::{
    lock_db, BlobStore, ChangesetRecord, ChangesetStore, DocumentRecord, DocumentStore,
    SharedNotebookDb,
};
use crate::subscription::{DocContentSubscriptions, DocListSubscriptions, OutlineNotifier};

/// Changesets applied since the last snapshot before a compaction is started.
pub const DEFAULT_MERGE_THRESHOLD: u32 = 20;

pub type DocumentHandle = Arc<AsyncMutex<DocumentState>>;

/// Result of `DocumentCache::apply_changeset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangesetOutcome {
    /// The changeset is applied and durable.
    Persisted { changeset_id: String, version: i64 },
    /// The content engine refused it; nothing was stored.
    Rejected(RejectReason),
}

/// Push channels the cache notifies after state changes.
#[derive(Clone)]
pub struct Broadcasters {
    pub content: Arc<DocContentSubscriptions>,
    pub list: Arc<DocListSubscriptions>,
    pub outline: Arc<OutlineNotifier>,
}

/// One reference to an open document. Returned by `get_or_open` and given
/// back to `close`.
#[derive(Debug)]
pub struct DocumentLease {
    id: String,
    generation: u64,
}

impl DocumentLease {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct CacheEntry {
    cell: Arc<OnceCell<DocumentHandle>>,
    ref_count: usize,
    generation: u64,
}

#[derive(Default)]
struct Entries {
    open: HashMap<String, CacheEntry>,
    /// Ids with a trash in progress; they cannot be opened until it finishes.
    trashing: HashMap<String, usize>,
}

pub struct DocumentCache {
    documents: Mutex<Entries>,
    next_generation: AtomicU64,
    db: SharedNotebookDb,
    clock: Arc<dyn Clock>,
    search: Arc<dyn SearchIndex>,
    broadcasters: Broadcasters,
    merge_threshold: u32,
    compactions: Mutex<Vec<JoinHandle<()>>>,
    completed_compactions: Arc<AtomicUsize>,
    loads: AtomicUsize,
}

impl DocumentCache {
    pub fn new(
        db: SharedNotebookDb,
        clock: Arc<dyn Clock>,
        search: Arc<dyn SearchIndex>,
        broadcasters: Broadcasters,
        merge_threshold: u32,
    ) -> Self {
        Self {
            documents: Mutex::new(Entries::default()),
            next_generation: AtomicU64::new(1),
            db,
            clock,
            search,
            broadcasters,
            merge_threshold: merge_threshold.max(1),
            compactions: Mutex::new(Vec::new()),
            completed_compactions: Arc::new(AtomicUsize::new(0)),
            loads: AtomicUsize::new(0),
        }
    }

    /// Insert a new active document whose title line holds `title`.
    pub fn create_document(&self, id: &str, title: &str) -> Result<SearchItem, DocumentError> {
        let now = self.clock.now_millis();
        let snapshot = Document::with_title(title)
            .to_json()
            .context("failed to encode initial document snapshot")?;
        let record = DocumentRecord {
            id: id.to_string(),
            title: title.to_string(),
            snapshot: Some(snapshot),
            snapshot_version: 0,
            trashed_at: None,
            accessed_at: now,
            created_at: now,
            modified_at: now,
        };
        {
            let db = lock_db(&self.db)?;
            DocumentStore::insert(db.connection(), &record)?;
        }

        let item = SearchItem {
            id: record.id,
            title: record.title,
            created_at: now,
            modified_at: now,
        };
        self.search.report(item.clone());
        self.broadcasters.list.broadcast();
        info!(doc_id = id, "created document");
        Ok(item)
    }

    /// Open `id`, loading it on first use. Each successful call must be
    /// balanced by one `close` of the returned lease.
    pub async fn get_or_open(
        &self,
        id: &str,
    ) -> Result<(DocumentHandle, DocumentLease), DocumentError> {
        let (cell, generation) = {
            let mut entries = self.lock_documents();
            if entries.trashing.contains_key(id) {
                return Err(DocumentError::not_found(id));
            }
            let entry = entries.open.entry(id.to_string()).or_insert_with(|| CacheEntry {
                cell: Arc::new(OnceCell::new()),
                ref_count: 0,
                generation: self.next_generation.fetch_add(1, Ordering::SeqCst),
            });
            entry.ref_count += 1;
            (Arc::clone(&entry.cell), entry.generation)
        };

        match cell.get_or_try_init(|| async { self.load(id) }).await {
            Ok(handle) => {
                Ok((Arc::clone(handle), DocumentLease { id: id.to_string(), generation }))
            }
            Err(error) => {
                self.release(id, generation);
                Err(error)
            }
        }
    }

    /// Give back one reference; the document is evicted when none remain.
    /// Returns `false` when the lease's entry is already gone, in which case
    /// nothing changes.
    pub fn close(&self, lease: DocumentLease) -> bool {
        let id = lease.id.as_str();
        let evicted = {
            let mut entries = self.lock_documents();
            let current = entries.open.get_mut(id).filter(|entry| entry.generation == lease.generation);
            let Some(entry) = current else {
                debug!(doc_id = id, generation = lease.generation, "ignored close of evicted lease");
                return false;
            };
            entry.ref_count = entry.ref_count.saturating_sub(1);
            if entry.ref_count == 0 {
                entries.open.remove(id);
                true
            } else {
                false
            }
        };

        if evicted {
            self.broadcasters.outline.forget(id);
            debug!(doc_id = id, "evicted document from cache");
        }
        true
    }

    pub fn get_open(&self, id: &str) -> Option<DocumentHandle> {
        self.lock_documents().open.get(id).and_then(|entry| entry.cell.get().cloned())
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.get_open(id).is_some()
    }

    pub fn ref_count(&self, id: &str) -> usize {
        self.lock_documents().open.get(id).map(|entry| entry.ref_count).unwrap_or(0)
    }

    pub fn open_count(&self) -> usize {
        self.lock_documents().open.len()
    }

    /// Storage loads performed so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Compactions that wrote a snapshot, background and explicit.
    pub fn completed_compactions(&self) -> usize {
        self.completed_compactions.load(Ordering::SeqCst)
    }

    /// Apply, persist and broadcast one changeset for an open document.
    pub async fn apply_changeset(
        &self,
        id: &str,
        changeset: Changeset,
    ) -> Result<ChangesetOutcome, DocumentError> {
        let handle = self.get_open(id).ok_or_else(|| DocumentError::not_open(id))?;
        let mut state = handle.lock().await;
        // Trash may have evicted the entry while we waited for the lock.
        if !self.is_current(id, &handle) {
            return Err(DocumentError::not_open(id));
        }

        let checkpoint = state.checkpoint();
        let title_changed = match state.apply_changeset(&changeset) {
            ApplyOutcome::Applied { title_changed } => title_changed,
            ApplyOutcome::Rejected(reason) => {
                debug!(doc_id = id, version = changeset.version, %reason, "changeset rejected");
                return Ok(ChangesetOutcome::Rejected(reason));
            }
        };

        let now = self.clock.now_millis();
        state.set_modified_at(now);
        let changeset_id = mk_changeset_id();
        if let Err(error) = self.persist_changeset(&state, &changeset_id, &changeset, now) {
            state.rollback(checkpoint);
            warn!(doc_id = id, ?error, "failed to persist changeset; rolled back");
            return Err(error.into());
        }

        let version = state.applied_version();
        debug!(doc_id = id, changeset_id = %changeset_id, version, "changeset applied");

        self.search.report(SearchItem {
            id: id.to_string(),
            title: state.title().to_string(),
            created_at: state.created_at(),
            modified_at: now,
        });
        self.broadcasters.content.broadcast_changeset(id, &changeset);
        if title_changed {
            self.broadcasters.list.broadcast();
        }
        self.broadcasters.outline.schedule(id, Arc::downgrade(&handle));

        let compaction_due =
            state.changeset_counter() >= self.merge_threshold && !state.compaction_pending();
        if compaction_due {
            state.set_compaction_pending(true);
        }
        drop(state);

        if compaction_due {
            self.spawn_compaction(id, &handle);
        }

        Ok(ChangesetOutcome::Persisted { changeset_id, version })
    }

    /// Fold the changeset log of an open document into its snapshot now.
    /// Returns whether a snapshot was written; a no-op at counter 0.
    pub async fn compact(&self, id: &str) -> Result<bool, DocumentError> {
        let handle = self.get_open(id).ok_or_else(|| DocumentError::not_open(id))?;
        let mut state = handle.lock().await;
        let compacted = compact_locked(&self.db, &mut state)?;
        if compacted {
            self.completed_compactions.fetch_add(1, Ordering::SeqCst);
        }
        Ok(compacted)
    }

    /// Wait for every background compaction started so far.
    pub async fn wait_for_compactions(&self) {
        loop {
            let tasks = std::mem::take(
                &mut *self.compactions.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(error) = task.await {
                    warn!(?error, "compaction task did not finish");
                }
            }
        }
    }

    /// Outline of an open document; `None` when it is not open.
    pub async fn outline(&self, id: &str) -> Result<Option<OutlineNode>, DocumentError> {
        let Some(handle) = self.get_open(id) else {
            return Ok(None);
        };
        let state = handle.lock().await;
        let db = lock_db(&self.db)?;
        Ok(Some(state.generate_outline(&StoredTitles::new(db.connection()), None)))
    }

    /// Listing entry for one active document, via a short-lived open.
    pub async fn document_info(&self, id: &str) -> Result<SearchItem, DocumentError> {
        let (handle, lease) = self.get_or_open(id).await?;
        let item = {
            let state = handle.lock().await;
            SearchItem {
                id: state.id().to_string(),
                title: state.title().to_string(),
                created_at: state.created_at(),
                modified_at: state.modified_at(),
            }
        };
        self.close(lease);
        Ok(item)
    }

    /// Move a document to trash, evicting it from the cache regardless of
    /// outstanding references. Trashing twice keeps the first timestamp.
    ///
    /// The id is unopenable from the moment the entry is evicted until the
    /// row is marked trashed, so no fresh state can be loaded in between.
    pub async fn move_to_trash(&self, id: &str) -> Result<(), DocumentError> {
        if id == HOME_DOCUMENT_ID {
            return Err(DocumentError::ProtectedDocument { id: id.to_string() });
        }

        let (_trashing, evicted) = self.begin_trash(id);
        // Wait out any in-flight edit before the row flips.
        let guard = match &evicted {
            Some(handle) => Some(handle.lock().await),
            None => None,
        };

        let now = self.clock.now_millis();
        let changed = {
            let db = lock_db(&self.db)?;
            if DocumentStore::get(db.connection(), id)?.is_none() {
                return Err(DocumentError::not_found(id));
            }
            DocumentStore::set_trashed(db.connection(), id, now)?
        };
        drop(guard);

        self.broadcasters.outline.forget(id);
        self.search.remove(id);
        if changed {
            self.broadcasters.content.broadcast_trash(id);
            self.broadcasters.list.broadcast();
            info!(doc_id = id, "moved document to trash");
        }
        Ok(())
    }

    /// Restore a trashed document. Recovering an active document is a no-op.
    pub fn recover(&self, id: &str) -> Result<(), DocumentError> {
        let (record, changed) = {
            let db = lock_db(&self.db)?;
            let record =
                DocumentStore::get(db.connection(), id)?.ok_or_else(|| DocumentError::not_found(id))?;
            let changed = DocumentStore::clear_trashed(db.connection(), id)?;
            (record, changed)
        };

        if changed {
            self.search.report(SearchItem {
                id: record.id,
                title: record.title,
                created_at: record.created_at,
                modified_at: record.modified_at,
            });
            self.broadcasters.list.broadcast();
            info!(doc_id = id, "recovered document");
        }
        Ok(())
    }

    /// Delete a trashed document with its changesets and owned blobs in one
    /// transaction. Documents outside the trash are reported as not found.
    pub fn delete_permanently(&self, id: &str) -> Result<(), DocumentError> {
        let mut db = lock_db(&self.db)?;
        let tx = db
            .connection_mut()
            .transaction()
            .context("failed to begin permanent deletion")?;

        match DocumentStore::get(&tx, id)? {
            Some(record) if record.is_trashed() => {}
            _ => return Err(DocumentError::not_found(id)),
        }
        let changesets = ChangesetStore::delete_for_document(&tx, id)?;
        let blobs = BlobStore::delete_by_owner(&tx, id)?;
        DocumentStore::delete(&tx, id)?;
        tx.commit().with_context(|| format!("failed to commit deletion of `{id}`"))?;

        info!(doc_id = id, changesets, blobs, "deleted document permanently");
        Ok(())
    }

    fn load(&self, id: &str) -> Result<DocumentHandle, DocumentError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now_millis();
        let mut state = {
            let db = lock_db(&self.db)?;
            let state = DocumentState::load(db.connection(), id)?;
            DocumentStore::touch_accessed(db.connection(), id, now)?;
            state
        };
        state.set_accessed_at(now);
        info!(doc_id = id, version = state.applied_version(), "opened document");
        Ok(Arc::new(AsyncMutex::new(state)))
    }

    /// Undo the reference taken by a failed open.
    fn release(&self, id: &str, generation: u64) {
        let mut entries = self.lock_documents();
        let Some(entry) = entries.open.get_mut(id) else {
            return;
        };
        if entry.generation != generation {
            return;
        }
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            entries.open.remove(id);
        }
    }

    /// Mark `id` as being trashed and evict its entry in one step.
    fn begin_trash(&self, id: &str) -> (TrashMarker<'_>, Option<DocumentHandle>) {
        let mut entries = self.lock_documents();
        *entries.trashing.entry(id.to_string()).or_insert(0) += 1;
        let evicted = entries.open.remove(id).and_then(|entry| entry.cell.get().cloned());
        (TrashMarker { cache: self, id: id.to_string() }, evicted)
    }

    fn is_current(&self, id: &str, handle: &DocumentHandle) -> bool {
        self.get_open(id).is_some_and(|current| Arc::ptr_eq(&current, handle))
    }

    fn persist_changeset(
        &self,
        state: &DocumentState,
        changeset_id: &str,
        changeset: &Changeset,
        now: i64,
    ) -> anyhow::Result<()> {
        let content = changeset.to_json().context("failed to encode changeset")?;
        let mut db = lock_db(&self.db)?;
        let tx = db.connection_mut().transaction().context("failed to begin changeset write")?;
        ChangesetStore::insert(
            &tx,
            &ChangesetRecord {
                id: changeset_id.to_string(),
                version_num: state.applied_version(),
                document_id: state.id().to_string(),
                content,
                created_at: now,
            },
        )?;
        if !DocumentStore::update_after_edit(&tx, state.id(), state.title(), now)? {
            bail!("document `{}` no longer exists", state.id());
        }
        tx.commit().context("failed to commit changeset write")?;
        Ok(())
    }

    fn spawn_compaction(&self, id: &str, handle: &DocumentHandle) {
        let db = Arc::clone(&self.db);
        let handle = Arc::clone(handle);
        let completed = Arc::clone(&self.completed_compactions);
        let doc_id = id.to_string();

        let task = tokio::spawn(async move {
            let mut state = handle.lock().await;
            match compact_locked(&db, &mut state) {
                Ok(true) => {
                    completed.fetch_add(1, Ordering::SeqCst);
                }
                Ok(false) => {}
                Err(error) => {
                    // Retried when the next changeset lands.
                    state.set_compaction_pending(false);
                    warn!(doc_id = %doc_id, ?error, "compaction failed");
                }
            }
        });

        let mut compactions = self.compactions.lock().unwrap_or_else(PoisonError::into_inner);
        compactions.retain(|task| !task.is_finished());
        compactions.push(task);
    }

    fn lock_documents(&self) -> MutexGuard<'_, Entries> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps an id unopenable while a trash is in progress. Cleared on drop,
/// including when the trash fails or is cancelled.
struct TrashMarker<'a> {
    cache: &'a DocumentCache,
    id: String,
}

impl Drop for TrashMarker<'_> {
    fn drop(&mut self) {
        let mut entries = self.cache.lock_documents();
        if let Some(count) = entries.trashing.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                entries.trashing.remove(&self.id);
            }
        }
    }
}

/// Write the current tree as the snapshot and drop the changesets it covers.
/// Rows newer than the captured version are kept.
fn compact_locked(db: &SharedNotebookDb, state: &mut DocumentState) -> anyhow::Result<bool> {
    if state.changeset_counter() == 0 {
        state.set_compaction_pending(false);
        return Ok(false);
    }

    let started = std::time::Instant::now();
    let snapshot = state.document().to_json().context("failed to encode snapshot")?;
    let version = state.applied_version();

    let deleted = {
        let mut db = lock_db(db)?;
        let tx = db.connection_mut().transaction().context("failed to begin compaction")?;
        if !DocumentStore::write_snapshot(&tx, state.id(), &snapshot, version)? {
            state.set_compaction_pending(false);
            debug!(doc_id = state.id(), "document row gone; compaction skipped");
            return Ok(false);
        }
        let deleted = ChangesetStore::delete_through(&tx, state.id(), version)?;
        tx.commit().context("failed to commit compaction")?;
        deleted
    };

    state.mark_compacted();
    info!(
        doc_id = state.id(),
        version,
        deleted,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "compacted changesets"
    );
    Ok(true)
}
