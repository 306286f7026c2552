// Server-initiated messages fanned out to subscribers.

use serde::{Deserialize, Serialize};

use crate::content::Changeset;
use crate::outline::OutlineNode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushMessage {
    /// A changeset was accepted for the subscribed document.
    DocContentChanged { sub_id: String, doc_id: String, changeset: Changeset },
    /// The subscribed document was moved to trash.
    DocTrashed { sub_id: String, doc_id: String },
    /// The document list (titles, membership, ordering) changed.
    DocListChanged { sub_id: String },
    /// The outline of an open document changed.
    OutlineChanged { doc_id: String, outline: OutlineNode },
}

impl PushMessage {
    /// Subscriber addressed by this message; outline pushes are unaddressed.
    pub fn sub_id(&self) -> Option<&str> {
        match self {
            Self::DocContentChanged { sub_id, .. }
            | Self::DocTrashed { sub_id, .. }
            | Self::DocListChanged { sub_id } => Some(sub_id),
            Self::OutlineChanged { .. } => None,
        }
    }
}
