// Full-database snapshot: every non-trashed document rebuilt independently of
// the document cache. Feeds the startup search index and the reference graph.

use std::collections::HashMap;
use std::time::Instant;

use anyhow::Result;
use quire_common::ids::HOME_DOCUMENT_ID;
use quire_common::types::{display_title, GraphInfo, GraphLink, GraphNode, SearchItem};
use rusqlite::Connection;
use tracing::{info, warn};

use super::document_state::DocumentState;
use crate::error::DocumentError;
use crate::store::DocumentStore;

const HOME_GRAPH_WEIGHT: u32 = 10;
const DEFAULT_GRAPH_WEIGHT: u32 = 4;

pub struct FullDatabaseSnapshot {
    /// Creation order.
    documents: Vec<DocumentState>,
}

impl FullDatabaseSnapshot {
    /// Load every active document. A document whose log fails to replay is
    /// logged and left out rather than failing the whole snapshot.
    pub fn load(conn: &Connection) -> Result<Self> {
        let started = Instant::now();
        let records = DocumentStore::list_active(conn)?;

        let mut documents = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id.clone();
            match DocumentState::from_record(conn, record) {
                Ok(state) => documents.push(state),
                Err(DocumentError::Storage(error)) if is_replay_failure(&error) => {
                    warn!(doc_id = %id, ?error, "document left out of full snapshot");
                }
                Err(error) => return Err(anyhow::Error::new(error)),
            }
        }

        info!(
            documents = documents.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built full database snapshot"
        );
        Ok(Self { documents })
    }

    pub fn documents(&self) -> &[DocumentState] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn search_items(&self) -> Vec<SearchItem> {
        self.documents
            .iter()
            .map(|state| SearchItem {
                id: state.id().to_string(),
                title: state.title().to_string(),
                created_at: state.created_at(),
                modified_at: state.modified_at(),
            })
            .collect()
    }

    /// Reference graph: one node per document, one link per distinct
    /// reference from a document to another live document.
    pub fn graph(&self) -> GraphInfo {
        let titles: HashMap<String, String> = self
            .documents
            .iter()
            .map(|state| (state.id().to_string(), state.title().to_string()))
            .collect();

        let mut graph = GraphInfo::default();
        for state in &self.documents {
            graph.nodes.push(GraphNode {
                id: state.id().to_string(),
                label: display_title(state.title()).to_string(),
                weight: if state.id() == HOME_DOCUMENT_ID {
                    HOME_GRAPH_WEIGHT
                } else {
                    DEFAULT_GRAPH_WEIGHT
                },
            });

            let mut references = Vec::new();
            state.generate_outline(&titles, Some(&mut references));
            graph.links.extend(references.into_iter().map(|target| GraphLink {
                source: state.id().to_string(),
                target,
            }));
        }
        graph
    }
}

fn is_replay_failure(error: &anyhow::Error) -> bool {
    error.downcast_ref::<rusqlite::Error>().is_none()
}
