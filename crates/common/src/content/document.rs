use serde::{Deserialize, Serialize};

use super::delta::Delta;
use crate::ids;

/// Field name addressing a document's title text.
pub const TITLE_FIELD: &str = "title";

/// Paragraph style of a text block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextType {
    #[default]
    Normal,
    Heading1,
    Heading2,
    Heading3,
    Bulleted,
    Numbered,
    Checkbox,
    Quoted,
}

impl TextType {
    /// Outline precedence: deeper headings have larger values, non-headings 0.
    pub const fn precedence(self) -> i32 {
        match self {
            Self::Heading1 => 1,
            Self::Heading2 => 2,
            Self::Heading3 => 3,
            _ => 0,
        }
    }

    pub const fn is_heading(self) -> bool {
        self.precedence() > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(default)]
    pub text_type: TextType,
    #[serde(default)]
    pub content: Delta,
}

impl Block {
    pub fn new(text_type: TextType, content: Delta) -> Self {
        Self { id: ids::mk_block_id(), text_type, content }
    }

    pub fn with_id(id: impl Into<String>, text_type: TextType, content: Delta) -> Self {
        Self { id: id.into(), text_type, content }
    }
}

/// The content tree of one note: a title line followed by a flat list of blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub title: Delta,
    #[serde(default)]
    pub body: Vec<Block>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(title: &str) -> Self {
        Self { title: Delta::from_text(title), body: Vec::new() }
    }

    pub fn title_text(&self) -> String {
        self.title.to_plain_string()
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.body.iter().find(|block| block.id == id)
    }

    pub fn block_mut(&mut self, id: &str) -> Option<&mut Block> {
        self.body.iter_mut().find(|block| block.id == id)
    }

    pub fn block_index(&self, id: &str) -> Option<usize> {
        self.body.iter().position(|block| block.id == id)
    }

    /// Plain text of a named field: `"title"` or a block id.
    pub fn text_content(&self, field: &str) -> Option<String> {
        if field == TITLE_FIELD {
            return Some(self.title_text());
        }
        self.block(field).map(|block| block.content.to_plain_string())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
