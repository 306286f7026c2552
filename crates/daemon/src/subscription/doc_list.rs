use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use quire_common::protocol::push::PushMessage;
use tracing::debug;

use super::debounce::{Coalescer, DebounceConfig};
use super::sink::PushSink;

const FLUSH_KEY: &str = "doc-list";

struct Subscribers {
    ids: Mutex<BTreeSet<String>>,
    sink: Arc<dyn PushSink>,
}

impl Subscribers {
    fn flush(&self) {
        let ids: Vec<String> =
            self.ids.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect();
        debug!(subscribers = ids.len(), "broadcasting document list change");
        for sub_id in ids {
            self.sink.push(PushMessage::DocListChanged { sub_id });
        }
    }
}

/// Global document-list subscribers. Broadcasts are coalesced over a window.
pub struct DocListSubscriptions {
    subscribers: Arc<Subscribers>,
    coalescer: Coalescer,
}

impl DocListSubscriptions {
    pub fn new(sink: Arc<dyn PushSink>, debounce: DebounceConfig) -> Self {
        Self {
            subscribers: Arc::new(Subscribers { ids: Mutex::new(BTreeSet::new()), sink }),
            coalescer: Coalescer::new(debounce),
        }
    }

    pub fn subscribe(&self, sub_id: &str) {
        self.subscribers.ids.lock().unwrap_or_else(PoisonError::into_inner).insert(sub_id.to_string());
    }

    pub fn unsubscribe(&self, sub_id: &str) {
        self.subscribers.ids.lock().unwrap_or_else(PoisonError::into_inner).remove(sub_id);
    }

    pub fn is_subscribed(&self, sub_id: &str) -> bool {
        self.subscribers.ids.lock().unwrap_or_else(PoisonError::into_inner).contains(sub_id)
    }

    /// Request a list-change push; requests within one window collapse into one.
    pub fn broadcast(&self) {
        let subscribers = Arc::clone(&self.subscribers);
        self.coalescer.schedule(FLUSH_KEY, move || async move { subscribers.flush() });
    }

    pub fn flush_pending(&self) -> bool {
        self.coalescer.is_pending(FLUSH_KEY)
    }
}
