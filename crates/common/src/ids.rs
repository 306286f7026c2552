// Type-prefixed identifiers. The prefix makes ids self-describing in logs.

use uuid::Uuid;

/// Fixed id of the seeded home page.
pub const HOME_DOCUMENT_ID: &str = "Home";

const DOC_PREFIX: &str = "Doc-";
const CHANGESET_PREFIX: &str = "Chs-";
const BLOCK_PREFIX: &str = "Blk-";
const BLOB_PREFIX: &str = "Blb-";
const SUBSCRIPTION_PREFIX: &str = "Sub-";

fn prefixed(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}

pub fn mk_doc_id() -> String {
    prefixed(DOC_PREFIX)
}

pub fn is_doc_id(id: &str) -> bool {
    id.starts_with(DOC_PREFIX) || id == HOME_DOCUMENT_ID
}

pub fn mk_changeset_id() -> String {
    prefixed(CHANGESET_PREFIX)
}

pub fn mk_block_id() -> String {
    prefixed(BLOCK_PREFIX)
}

pub fn mk_blob_id() -> String {
    prefixed(BLOB_PREFIX)
}

pub fn mk_subscription_id() -> String {
    prefixed(SUBSCRIPTION_PREFIX)
}
