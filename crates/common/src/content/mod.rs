// Content-tree engine: document model, text deltas, changesets and versioned state.

pub mod changeset;
pub mod delta;
pub mod document;
pub mod state;

pub use changeset::{Changeset, Operation, RejectReason, TextTarget};
pub use delta::{Delta, DeltaOp, Embed, Insert};
pub use document::{Block, Document, TextType, TITLE_FIELD};
pub use state::ContentState;
