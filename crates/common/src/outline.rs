// Derived outline tree of one document: headings nested by precedence, with
// cross-document references as leaves.

use serde::{Deserialize, Serialize};

use crate::content::TextType;

/// Priority assigned to reference leaves; below every heading so a reference
/// never becomes a container.
pub const REFERENCE_PRIORITY: i32 = -100;

/// Priority of the root (title) node.
pub const TITLE_PRIORITY: i32 = 0;

/// Id of the root node.
pub const TITLE_NODE_ID: &str = "title";

/// Prefix of reference node ids; the remainder is the target document id.
pub const REFERENCE_NODE_PREFIX: &str = "Ref-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlineNodeType {
    Normal,
    Reference,
    Heading1,
    Heading2,
    Heading3,
}

impl OutlineNodeType {
    pub fn from_text_type(text_type: TextType) -> Self {
        match text_type {
            TextType::Heading1 => Self::Heading1,
            TextType::Heading2 => Self::Heading2,
            TextType::Heading3 => Self::Heading3,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub id: String,
    pub title: String,
    pub priority: i32,
    pub node_type: OutlineNodeType,
    #[serde(default)]
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn reference(doc_id: &str, title: String) -> Self {
        Self {
            id: format!("{REFERENCE_NODE_PREFIX}{doc_id}"),
            title,
            priority: REFERENCE_PRIORITY,
            node_type: OutlineNodeType::Reference,
            children: Vec::new(),
        }
    }

    /// Target document id when this node is a reference.
    pub fn reference_target(&self) -> Option<&str> {
        if self.node_type != OutlineNodeType::Reference {
            return None;
        }
        self.id.strip_prefix(REFERENCE_NODE_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_nodes_expose_their_target() {
        let node = OutlineNode::reference("Doc-y", "Y".into());
        assert_eq!(node.id, "Ref-Doc-y");
        assert_eq!(node.priority, REFERENCE_PRIORITY);
        assert_eq!(node.reference_target(), Some("Doc-y"));
    }

    #[test]
    fn headings_map_to_outline_types() {
        assert_eq!(OutlineNodeType::from_text_type(TextType::Heading2), OutlineNodeType::Heading2);
        assert_eq!(OutlineNodeType::from_text_type(TextType::Bulleted), OutlineNodeType::Normal);
    }
}
