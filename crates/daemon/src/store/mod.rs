// Persistence: SQLite notebook and app databases, migrations, table access.

pub mod app_db;
pub mod blobs;
pub mod changesets;
pub mod documents;
pub mod migration;
pub mod notebook_db;

pub use blobs::{BlobRecord, BlobStore};
pub use changesets::{ChangesetRecord, ChangesetStore};
pub use documents::{DocumentRecord, DocumentStore};
pub use notebook_db::{lock_db, NotebookDb, SharedNotebookDb};
