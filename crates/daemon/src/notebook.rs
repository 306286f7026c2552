// One open notebook: the database, the document cache, title search and the
// subscription channels, wired together and exposed as document operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use quire_common::content::Changeset;
use quire_common::ids::{mk_doc_id, mk_subscription_id, HOME_DOCUMENT_ID};
use quire_common::outline::OutlineNode;
use quire_common::types::{display_title, GraphInfo, OpenDocumentResponse, SearchItem};
use tracing::info;

use crate::clock::Clock;
use crate::engine::{
    Broadcasters, ChangesetOutcome, DocumentCache, DocumentLease, FullDatabaseSnapshot,
    DEFAULT_MERGE_THRESHOLD,
};
use crate::error::DocumentError;
use crate::search::{SearchIndex, TitleSearchIndex, DEFAULT_SEARCH_LIMIT};
use crate::store::{lock_db, BlobRecord, BlobStore, DocumentRecord, DocumentStore, NotebookDb, SharedNotebookDb};
use crate::subscription::{
    DebounceConfig, DocContentSubscriptions, DocListSubscriptions, OutlineNotifier, PushSink,
};

/// Title of the seeded home page.
pub const HOME_TITLE: &str = "Home";
/// Upper bound on `recent_documents`.
pub const MAX_RECENT_LIMIT: usize = 100;
const DEFAULT_OUTLINE_DEBOUNCE_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotebookOptions {
    pub merge_threshold: u32,
    pub doc_list_debounce: DebounceConfig,
    pub outline_debounce: DebounceConfig,
    pub search_limit: usize,
}

impl Default for NotebookOptions {
    fn default() -> Self {
        Self {
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            doc_list_debounce: DebounceConfig::default(),
            outline_debounce: DebounceConfig::with_millis(DEFAULT_OUTLINE_DEBOUNCE_MS),
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

pub struct Notebook {
    path: PathBuf,
    db: SharedNotebookDb,
    clock: Arc<dyn Clock>,
    cache: DocumentCache,
    search: Arc<dyn SearchIndex>,
    content_subs: Arc<DocContentSubscriptions>,
    list_subs: Arc<DocListSubscriptions>,
    search_limit: usize,
}

impl Notebook {
    /// Open (creating and migrating if needed) the notebook database at
    /// `path`, seed the home page and index every active title.
    pub fn open(
        path: impl AsRef<Path>,
        options: NotebookOptions,
        sink: Arc<dyn PushSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = NotebookDb::open(&path)?.into_shared();

        let search: Arc<dyn SearchIndex> = Arc::new(TitleSearchIndex::new());
        let content_subs = Arc::new(DocContentSubscriptions::new(Arc::clone(&sink)));
        let list_subs =
            Arc::new(DocListSubscriptions::new(Arc::clone(&sink), options.doc_list_debounce));
        let outline =
            Arc::new(OutlineNotifier::new(Arc::clone(&db), sink, options.outline_debounce));
        let cache = DocumentCache::new(
            Arc::clone(&db),
            Arc::clone(&clock),
            Arc::clone(&search),
            Broadcasters {
                content: Arc::clone(&content_subs),
                list: Arc::clone(&list_subs),
                outline,
            },
            options.merge_threshold,
        );

        let notebook = Self {
            path,
            db,
            clock,
            cache,
            search,
            content_subs,
            list_subs,
            search_limit: options.search_limit.max(1),
        };
        notebook.seed_home()?;
        notebook.rebuild_search_index()?;

        info!(path = %notebook.path.display(), documents = notebook.search.len(), "opened notebook");
        Ok(notebook)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub fn db(&self) -> &SharedNotebookDb {
        &self.db
    }

    pub fn create_document(&self, title: Option<&str>) -> Result<String, DocumentError> {
        let id = mk_doc_id();
        self.cache.create_document(&id, title.unwrap_or_default())?;
        Ok(id)
    }

    /// Open a document and return everything an editor needs to show it,
    /// plus the lease to hand back to `close_document`.
    pub async fn open_document(
        &self,
        id: &str,
    ) -> Result<(OpenDocumentResponse, DocumentLease), DocumentError> {
        let (handle, lease) = self.cache.get_or_open(id).await?;
        let response = handle.lock().await.generate_response();
        Ok((response, lease))
    }

    /// Returns `false` when the document was trashed since the lease was
    /// taken; the close is then ignored.
    pub fn close_document(&self, lease: DocumentLease) -> bool {
        self.cache.close(lease)
    }

    pub async fn apply_changeset(
        &self,
        id: &str,
        changeset: Changeset,
    ) -> Result<ChangesetOutcome, DocumentError> {
        self.cache.apply_changeset(id, changeset).await
    }

    pub async fn outline(&self, id: &str) -> Result<Option<OutlineNode>, DocumentError> {
        self.cache.outline(id).await
    }

    pub async fn document_info(&self, ids: &[String]) -> Result<Vec<SearchItem>, DocumentError> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.push(self.cache.document_info(id).await?);
        }
        Ok(items)
    }

    /// Most recently modified active documents, newest first.
    pub fn recent_documents(&self, limit: usize) -> Result<Vec<SearchItem>, DocumentError> {
        let limit = limit.min(MAX_RECENT_LIMIT);
        let db = lock_db(&self.db)?;
        let records = DocumentStore::list_recent(db.connection(), limit)?;
        Ok(records.into_iter().map(listing_item).collect())
    }

    /// Trashed documents, most recently trashed first.
    pub fn fetch_trash(&self) -> Result<Vec<SearchItem>, DocumentError> {
        let db = lock_db(&self.db)?;
        let records = DocumentStore::list_trashed(db.connection())?;
        Ok(records.into_iter().map(listing_item).collect())
    }

    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<SearchItem> {
        self.search.search(query, limit.unwrap_or(self.search_limit))
    }

    pub async fn move_to_trash(&self, id: &str) -> Result<(), DocumentError> {
        self.cache.move_to_trash(id).await
    }

    pub fn recover(&self, id: &str) -> Result<(), DocumentError> {
        self.cache.recover(id)
    }

    pub fn delete_permanently(&self, id: &str) -> Result<(), DocumentError> {
        self.cache.delete_permanently(id)
    }

    /// Reference graph over every active document, built from storage.
    pub fn graph(&self) -> Result<GraphInfo, DocumentError> {
        let started = Instant::now();
        let graph = {
            let db = lock_db(&self.db)?;
            FullDatabaseSnapshot::load(db.connection())?.graph()
        };
        info!(
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "computed document graph"
        );
        Ok(graph)
    }

    /// Store a blob owned by an existing document.
    pub fn store_blob(&self, owner_id: &str, content: &[u8]) -> Result<String, DocumentError> {
        let now = self.clock.now_millis();
        let db = lock_db(&self.db)?;
        if DocumentStore::get(db.connection(), owner_id)?.is_none() {
            return Err(DocumentError::not_found(owner_id));
        }
        Ok(BlobStore::insert(db.connection(), owner_id, content, now)?)
    }

    pub fn get_blob(&self, id: &str) -> Result<Option<BlobRecord>, DocumentError> {
        let now = self.clock.now_millis();
        let db = lock_db(&self.db)?;
        Ok(BlobStore::get(db.connection(), id, now)?)
    }

    /// Subscribe to content changes of `doc_id`; returns the new subscriber id.
    pub fn subscribe_doc_content(&self, doc_id: &str) -> String {
        let sub_id = mk_subscription_id();
        self.content_subs.subscribe(&sub_id, doc_id);
        sub_id
    }

    pub fn unsubscribe_doc_content(&self, sub_id: &str) {
        self.content_subs.unsubscribe(sub_id);
    }

    /// Subscribe to document-list changes; returns the new subscriber id.
    pub fn subscribe_doc_list(&self) -> String {
        let sub_id = mk_subscription_id();
        self.list_subs.subscribe(&sub_id);
        sub_id
    }

    pub fn unsubscribe_doc_list(&self, sub_id: &str) {
        self.list_subs.unsubscribe(sub_id);
    }

    /// Whether `sub_id` is a live content or list subscription.
    pub fn has_subscription(&self, sub_id: &str) -> bool {
        self.content_subs.is_subscribed(sub_id) || self.list_subs.is_subscribed(sub_id)
    }

    pub async fn compact(&self, id: &str) -> Result<bool, DocumentError> {
        self.cache.compact(id).await
    }

    /// Let in-flight background work finish before the database goes away.
    pub async fn shutdown(&self) {
        self.cache.wait_for_compactions().await;
        info!(path = %self.path.display(), "notebook closed");
    }

    fn seed_home(&self) -> Result<()> {
        let exists = {
            let db = lock_db(&self.db)?;
            DocumentStore::get(db.connection(), HOME_DOCUMENT_ID)?.is_some()
        };
        if !exists {
            self.cache.create_document(HOME_DOCUMENT_ID, HOME_TITLE)?;
            info!("seeded home page");
        }
        Ok(())
    }

    fn rebuild_search_index(&self) -> Result<()> {
        let items = {
            let db = lock_db(&self.db)?;
            FullDatabaseSnapshot::load(db.connection())?.search_items()
        };
        self.search.rebuild(items);
        Ok(())
    }
}

fn listing_item(record: DocumentRecord) -> SearchItem {
    SearchItem {
        title: display_title(&record.title).to_string(),
        id: record.id,
        created_at: record.created_at,
        modified_at: record.modified_at,
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::clock::ManualClock;
    use crate::subscription::sink::testing::RecordingSink;

    fn open(tmp: &TempDir, clock: Arc<ManualClock>) -> Notebook {
        Notebook::open(
            tmp.path().join("notebook.db"),
            NotebookOptions::default(),
            Arc::new(RecordingSink::default()),
            clock,
        )
        .expect("notebook should open")
    }

    #[tokio::test]
    async fn first_open_seeds_home_once() {
        let tmp = TempDir::new().unwrap();
        let notebook = open(&tmp, Arc::new(ManualClock::new(10)));
        let (home, lease) = notebook.open_document(HOME_DOCUMENT_ID).await.unwrap();
        assert_eq!(home.snapshot.title_text(), "Home");
        assert!(notebook.close_document(lease));
        drop(notebook);

        let notebook = open(&tmp, Arc::new(ManualClock::new(20)));
        let recent = notebook.recent_documents(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].created_at, 10);
        assert_eq!(notebook.search("Home", None)[0].id, HOME_DOCUMENT_ID);
    }

    #[tokio::test]
    async fn listings_fall_back_to_untitled() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(10));
        let notebook = open(&tmp, clock.clone());

        clock.set(20);
        let untitled = notebook.create_document(None).unwrap();
        clock.set(30);
        let trashed = notebook.create_document(Some("")).unwrap();
        notebook.move_to_trash(&trashed).await.unwrap();

        let recent = notebook.recent_documents(500).unwrap();
        let ids: Vec<&str> = recent.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec![untitled.as_str(), HOME_DOCUMENT_ID]);
        assert_eq!(recent[0].title, "Untitled document");

        let trash = notebook.fetch_trash().unwrap();
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].title, "Untitled document");
    }

    #[tokio::test]
    async fn blobs_need_an_existing_owner() {
        let tmp = TempDir::new().unwrap();
        let notebook = open(&tmp, Arc::new(ManualClock::new(10)));

        let blob_id = notebook.store_blob(HOME_DOCUMENT_ID, b"bytes").unwrap();
        let blob = notebook.get_blob(&blob_id).unwrap().expect("blob should exist");
        assert_eq!(blob.content, b"bytes");
        assert!(matches!(
            notebook.store_blob("Doc-nope", b"x"),
            Err(DocumentError::NotFound { .. })
        ));
        assert!(notebook.get_blob("Blb-nope").unwrap().is_none());
    }

    #[tokio::test]
    async fn subscriptions_get_fresh_ids() {
        let tmp = TempDir::new().unwrap();
        let notebook = open(&tmp, Arc::new(ManualClock::new(10)));
        let a = notebook.subscribe_doc_list();
        let b = notebook.subscribe_doc_content(HOME_DOCUMENT_ID);
        assert!(a.starts_with("Sub-"));
        assert_ne!(a, b);
        assert!(notebook.has_subscription(&a) && notebook.has_subscription(&b));
        notebook.unsubscribe_doc_list(&a);
        notebook.unsubscribe_doc_content(&b);
        assert!(!notebook.has_subscription(&a) && !notebook.has_subscription(&b));
    }
}
