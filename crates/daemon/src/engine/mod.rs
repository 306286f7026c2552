// Document engine: per-document state, the shared open-document cache, outline
// generation and the uncached full-database snapshot.

pub mod document_cache;
pub mod document_state;
pub mod outline;
pub mod snapshot;

pub use document_cache::{
    Broadcasters, ChangesetOutcome, DocumentCache, DocumentHandle, DocumentLease,
    DEFAULT_MERGE_THRESHOLD,
};
pub use document_state::{ApplyOutcome, DocumentState};
pub use outline::{generate_outline, StoredTitles, TitleLookup};
pub use snapshot::FullDatabaseSnapshot;
