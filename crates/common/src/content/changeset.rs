use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::delta::Embed;
use super::document::{Block, TextType};

/// Which text model an operation edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TextTarget {
    Title,
    Block { id: String },
}

impl TextTarget {
    pub fn block(id: impl Into<String>) -> Self {
        Self::Block { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Insert a block after `after`, or at the top of the body when `None`.
    InsertBlock {
        #[serde(default)]
        after: Option<String>,
        block: Block,
    },
    RemoveBlock {
        id: String,
    },
    SetTextType {
        id: String,
        text_type: TextType,
    },
    InsertText {
        target: TextTarget,
        index: usize,
        text: String,
    },
    InsertEmbed {
        target: TextTarget,
        index: usize,
        embed: Embed,
    },
    DeleteText {
        target: TextTarget,
        index: usize,
        len: usize,
    },
}

/// One atomic edit. `version` is the document version this changeset produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    pub version: i64,
    pub operations: Vec<Operation>,
}

impl Changeset {
    pub fn new(version: i64) -> Self {
        Self { version, operations: Vec::new() }
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Why the engine refused a changeset. Rejection leaves the state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("changeset version {version} is not newer than applied version {applied}")]
    StaleVersion { version: i64, applied: i64 },

    #[error("changeset version {version} skips ahead of applied version {applied}")]
    VersionGap { version: i64, applied: i64 },

    #[error("block `{id}` does not exist")]
    UnknownBlock { id: String },

    #[error("block `{id}` already exists")]
    DuplicateBlock { id: String },

    #[error("position {index} is out of range for text of length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("changeset or operation has no effect")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::delta::Delta;

    #[test]
    fn wire_format_is_tagged_by_op() {
        let changeset = Changeset::new(3)
            .with_operation(Operation::InsertText {
                target: TextTarget::Title,
                index: 0,
                text: "Hi".into(),
            })
            .with_operation(Operation::InsertBlock {
                after: None,
                block: Block::with_id("Blk-1", TextType::Heading1, Delta::from_text("Intro")),
            });

        let json = serde_json::to_value(&changeset).unwrap();
        assert_eq!(json["version"], 3);
        assert_eq!(json["operations"][0]["op"], "insert_text");
        assert_eq!(json["operations"][0]["target"]["kind"], "title");
        assert_eq!(json["operations"][1]["block"]["text_type"], "heading1");

        let decoded = Changeset::from_json(&json.to_string()).unwrap();
        assert_eq!(decoded, changeset);
    }
}
