// Debounced outline pushes for open documents.
//
// After an edit the outline is regenerated once per window and pushed only
// when it differs from the last outline pushed for that document.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use quire_common::outline::OutlineNode;
use quire_common::protocol::push::PushMessage;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::debounce::{Coalescer, DebounceConfig};
use super::sink::PushSink;
use crate::engine::outline::StoredTitles;
use crate::engine::DocumentState;
use crate::store::{lock_db, SharedNotebookDb};

pub struct OutlineNotifier {
    db: SharedNotebookDb,
    sink: Arc<dyn PushSink>,
    coalescer: Coalescer,
    last_pushed: Arc<Mutex<HashMap<String, OutlineNode>>>,
}

impl OutlineNotifier {
    pub fn new(db: SharedNotebookDb, sink: Arc<dyn PushSink>, debounce: DebounceConfig) -> Self {
        Self {
            db,
            sink,
            coalescer: Coalescer::new(debounce),
            last_pushed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Regenerate and push the outline of `doc_id` after the debounce window.
    /// Nothing is pushed if the document has been evicted by then.
    pub fn schedule(&self, doc_id: &str, state: Weak<AsyncMutex<DocumentState>>) {
        let db = Arc::clone(&self.db);
        let sink = Arc::clone(&self.sink);
        let last_pushed = Arc::clone(&self.last_pushed);
        let doc_id_owned = doc_id.to_string();

        self.coalescer.schedule(doc_id, move || async move {
            let Some(state) = state.upgrade() else {
                debug!(doc_id = %doc_id_owned, "document closed before outline refresh");
                return;
            };

            let outline = {
                let state = state.lock().await;
                let guard = match lock_db(&db) {
                    Ok(guard) => guard,
                    Err(error) => {
                        warn!(doc_id = %doc_id_owned, ?error, "outline refresh skipped");
                        return;
                    }
                };
                state.generate_outline(&StoredTitles::new(guard.connection()), None)
            };

            let changed = {
                let mut last_pushed = last_pushed.lock().unwrap_or_else(PoisonError::into_inner);
                if last_pushed.get(&doc_id_owned) == Some(&outline) {
                    false
                } else {
                    last_pushed.insert(doc_id_owned.clone(), outline.clone());
                    true
                }
            };

            if changed {
                debug!(doc_id = %doc_id_owned, "pushing outline");
                sink.push(PushMessage::OutlineChanged { doc_id: doc_id_owned, outline });
            }
        });
    }

    /// Drop remembered state for a document leaving the cache.
    pub fn forget(&self, doc_id: &str) {
        self.last_pushed.lock().unwrap_or_else(PoisonError::into_inner).remove(doc_id);
    }
}
