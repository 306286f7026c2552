use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use quire_common::content::Changeset;
use quire_common::protocol::push::PushMessage;
use tracing::debug;

use super::sink::PushSink;

/// Per-document content-change subscribers: document id → subscriber ids.
pub struct DocContentSubscriptions {
    subscribers: Mutex<HashMap<String, Vec<String>>>,
    sink: Arc<dyn PushSink>,
}

impl DocContentSubscriptions {
    pub fn new(sink: Arc<dyn PushSink>) -> Self {
        Self { subscribers: Mutex::new(HashMap::new()), sink }
    }

    pub fn subscribe(&self, sub_id: &str, doc_id: &str) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let list = subscribers.entry(doc_id.to_string()).or_default();
        if !list.iter().any(|existing| existing == sub_id) {
            list.push(sub_id.to_string());
        }
        debug!(sub_id, doc_id, "content subscription added");
    }

    /// Remove `sub_id` from every document it is subscribed to.
    pub fn unsubscribe(&self, sub_id: &str) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|_, list| {
            list.retain(|existing| existing != sub_id);
            !list.is_empty()
        });
        debug!(sub_id, "content subscription removed");
    }

    pub fn is_subscribed(&self, sub_id: &str) -> bool {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|list| list.iter().any(|existing| existing == sub_id))
    }

    pub fn subscribers_of(&self, doc_id: &str) -> Vec<String> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(doc_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn broadcast_changeset(&self, doc_id: &str, changeset: &Changeset) {
        for sub_id in self.subscribers_of(doc_id) {
            self.sink.push(PushMessage::DocContentChanged {
                sub_id,
                doc_id: doc_id.to_string(),
                changeset: changeset.clone(),
            });
        }
    }

    pub fn broadcast_trash(&self, doc_id: &str) {
        for sub_id in self.subscribers_of(doc_id) {
            self.sink.push(PushMessage::DocTrashed { sub_id, doc_id: doc_id.to_string() });
        }
    }
}
