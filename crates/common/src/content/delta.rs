// Rich text as an ordered list of inserts: plain text runs and inline embeds.
//
// Positions count characters; every embed occupies exactly one position.

use serde::{Deserialize, Serialize};

use super::changeset::RejectReason;

/// An inline object living inside a text run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Embed {
    /// Points at another document by id.
    Reference { doc_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Insert {
    Text(String),
    Embed(Embed),
}

impl Insert {
    fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.chars().count(),
            Self::Embed(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaOp {
    pub insert: Insert,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub ops: Vec<DeltaOp>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        let mut delta = Self::new();
        if !text.is_empty() {
            delta.ops.push(DeltaOp { insert: Insert::Text(text.to_string()) });
        }
        delta
    }

    /// Builder used by fixtures and the home page seed.
    pub fn push_text(mut self, text: &str) -> Self {
        self.ops.push(DeltaOp { insert: Insert::Text(text.to_string()) });
        self.normalize();
        self
    }

    pub fn push_reference(mut self, doc_id: &str) -> Self {
        self.ops.push(DeltaOp {
            insert: Insert::Embed(Embed::Reference { doc_id: doc_id.to_string() }),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.iter().map(|op| op.insert.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenated text runs; embeds are skipped.
    pub fn to_plain_string(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match &op.insert {
                Insert::Text(text) => Some(text.as_str()),
                Insert::Embed(_) => None,
            })
            .collect()
    }

    /// Target ids of every reference embed, in document order (duplicates kept).
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match &op.insert {
            Insert::Embed(Embed::Reference { doc_id }) => Some(doc_id.as_str()),
            Insert::Text(_) => None,
        })
    }

    pub fn insert(&mut self, index: usize, insert: Insert) -> Result<(), RejectReason> {
        if let Insert::Text(text) = &insert {
            if text.is_empty() {
                return Err(RejectReason::Empty);
            }
        }

        let len = self.len();
        if index > len {
            return Err(RejectReason::OutOfRange { index, len });
        }

        let (op_index, offset) = self.locate(index);
        if offset == 0 {
            self.ops.insert(op_index, DeltaOp { insert });
        } else {
            // Only text runs can be entered at a non-zero offset.
            let Insert::Text(existing) = &self.ops[op_index].insert else {
                return Err(RejectReason::OutOfRange { index, len });
            };
            let split_at = byte_offset(existing, offset);
            let tail = existing[split_at..].to_string();
            let head = existing[..split_at].to_string();
            self.ops[op_index].insert = Insert::Text(head);
            self.ops.insert(op_index + 1, DeltaOp { insert });
            self.ops.insert(op_index + 2, DeltaOp { insert: Insert::Text(tail) });
        }

        self.normalize();
        Ok(())
    }

    pub fn delete(&mut self, index: usize, count: usize) -> Result<(), RejectReason> {
        if count == 0 {
            return Err(RejectReason::Empty);
        }
        let len = self.len();
        let end = index.checked_add(count).unwrap_or(usize::MAX);
        if end > len {
            return Err(RejectReason::OutOfRange { index: end, len });
        }

        let mut kept = Vec::with_capacity(self.ops.len());
        let mut position = 0usize;
        for op in self.ops.drain(..) {
            let op_len = op.insert.len();
            let op_start = position;
            position += op_len;

            match op.insert {
                Insert::Text(text) => {
                    let remaining: String = text
                        .chars()
                        .enumerate()
                        .filter(|(offset, _)| {
                            let at = op_start + offset;
                            at < index || at >= end
                        })
                        .map(|(_, ch)| ch)
                        .collect();
                    kept.push(DeltaOp { insert: Insert::Text(remaining) });
                }
                Insert::Embed(embed) => {
                    if op_start < index || op_start >= end {
                        kept.push(DeltaOp { insert: Insert::Embed(embed) });
                    }
                }
            }
        }
        self.ops = kept;
        self.normalize();
        Ok(())
    }

    /// Returns `(op_index, offset_within_op)` for a position; the end position
    /// maps to `(ops.len(), 0)`.
    fn locate(&self, index: usize) -> (usize, usize) {
        let mut position = 0usize;
        for (op_index, op) in self.ops.iter().enumerate() {
            let op_len = op.insert.len();
            if index < position + op_len {
                return (op_index, index - position);
            }
            position += op_len;
        }
        (self.ops.len(), 0)
    }

    fn normalize(&mut self) {
        let mut merged: Vec<DeltaOp> = Vec::with_capacity(self.ops.len());
        for op in self.ops.drain(..) {
            match op.insert {
                Insert::Text(text) if text.is_empty() => {}
                Insert::Text(text) => match merged.last_mut() {
                    Some(DeltaOp { insert: Insert::Text(previous) }) => previous.push_str(&text),
                    _ => merged.push(DeltaOp { insert: Insert::Text(text) }),
                },
                embed => merged.push(DeltaOp { insert: embed }),
            }
        }
        self.ops = merged;
    }
}

fn byte_offset(text: &str, char_offset: usize) -> usize {
    text.char_indices().nth(char_offset).map(|(byte, _)| byte).unwrap_or(text.len())
}
