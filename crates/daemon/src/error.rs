use thiserror::Error;

/// Failures surfaced by document-level operations.
///
/// A changeset the content engine refuses is not an error; see
/// [`crate::engine::ChangesetOutcome::Rejected`].
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The document does not exist, or is not in the state the operation
    /// requires (active for reads and edits, trashed for permanent deletion).
    #[error("document `{id}` not found")]
    NotFound { id: String },

    #[error("document `{id}` is not open")]
    NotOpen { id: String },

    #[error("document `{id}` is protected and cannot be moved to trash")]
    ProtectedDocument { id: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl DocumentError {
    pub fn not_found(id: &str) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    pub fn not_open(id: &str) -> Self {
        Self::NotOpen { id: id.to_string() }
    }
}
