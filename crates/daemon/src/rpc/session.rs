// What one RPC connection holds in the notebook: document leases and
// subscription ids. Released together when the connection ends.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::engine::DocumentLease;
use crate::notebook::Notebook;

#[derive(Default)]
pub struct ConnectionSession {
    inner: Mutex<Held>,
}

#[derive(Default)]
struct Held {
    leases: HashMap<String, Vec<DocumentLease>>,
    content_subs: BTreeSet<String>,
    list_subs: BTreeSet<String>,
}

/// Counts of what `ConnectionSession::release` gave back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Released {
    pub leases: usize,
    pub subscriptions: usize,
}

impl ConnectionSession {
    pub fn hold_lease(&self, lease: DocumentLease) {
        self.lock().leases.entry(lease.id().to_string()).or_default().push(lease);
    }

    /// One lease this connection holds for `doc_id`, if any.
    pub fn take_lease(&self, doc_id: &str) -> Option<DocumentLease> {
        let mut held = self.lock();
        let leases = held.leases.get_mut(doc_id)?;
        let lease = leases.pop();
        if leases.is_empty() {
            held.leases.remove(doc_id);
        }
        lease
    }

    pub fn track_content_sub(&self, sub_id: &str) {
        self.lock().content_subs.insert(sub_id.to_string());
    }

    pub fn forget_content_sub(&self, sub_id: &str) {
        self.lock().content_subs.remove(sub_id);
    }

    pub fn track_list_sub(&self, sub_id: &str) {
        self.lock().list_subs.insert(sub_id.to_string());
    }

    pub fn forget_list_sub(&self, sub_id: &str) {
        self.lock().list_subs.remove(sub_id);
    }

    pub fn lease_count(&self) -> usize {
        self.lock().leases.values().map(Vec::len).sum()
    }

    /// Close every held lease and drop every subscription.
    pub fn release(&self, notebook: &Notebook) -> Released {
        let held = std::mem::take(&mut *self.lock());

        let mut released = Released::default();
        for lease in held.leases.into_values().flatten() {
            notebook.close_document(lease);
            released.leases += 1;
        }
        for sub_id in &held.content_subs {
            notebook.unsubscribe_doc_content(sub_id);
            released.subscriptions += 1;
        }
        for sub_id in &held.list_subs {
            notebook.unsubscribe_doc_list(sub_id);
            released.subscriptions += 1;
        }

        released
    }

    fn lock(&self) -> MutexGuard<'_, Held> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
