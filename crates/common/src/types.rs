// Wire-level domain types shared between the daemon and its clients.

use serde::{Deserialize, Serialize};

use crate::content::Document;

/// Display label for documents whose derived title is empty.
pub const UNTITLED_DOCUMENT: &str = "Untitled document";

/// Title to show for a derived title, substituting the untitled label.
pub fn display_title(title: &str) -> &str {
    if title.is_empty() {
        UNTITLED_DOCUMENT
    } else {
        title
    }
}

/// Everything an editor needs to hydrate a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDocumentResponse {
    pub id: String,
    pub snapshot: Document,
    /// Version of the last changeset applied to `snapshot`.
    pub snapshot_version: i64,
    pub accessed_at: i64,
    pub created_at: i64,
    pub modified_at: i64,
}

/// A document listing entry, also the unit stored in the title search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchItem {
    pub id: String,
    pub title: String,
    pub created_at: i64,
    pub modified_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
}

/// Reference graph over every non-trashed document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphInfo {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}
