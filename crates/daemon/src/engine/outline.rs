// Single-pass outline generation over a document body.
//
// Headings open nested sections on a stack keyed by precedence; references
// inside non-heading blocks become leaves of whichever section is open.

use std::collections::{HashMap, HashSet};

use quire_common::content::Document;
use quire_common::outline::{OutlineNode, OutlineNodeType, TITLE_NODE_ID, TITLE_PRIORITY};
use quire_common::types::display_title;
use rusqlite::Connection;
use tracing::warn;

use crate::store::DocumentStore;

/// Resolves a referenced document id to its title. `None` means the target is
/// missing or trashed and the reference is skipped.
pub trait TitleLookup {
    fn title_of(&self, doc_id: &str) -> Option<String>;
}

impl TitleLookup for HashMap<String, String> {
    fn title_of(&self, doc_id: &str) -> Option<String> {
        self.get(doc_id).cloned()
    }
}

/// Titles read straight from the `document` table.
pub struct StoredTitles<'a> {
    conn: &'a Connection,
}

impl<'a> StoredTitles<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl TitleLookup for StoredTitles<'_> {
    fn title_of(&self, doc_id: &str) -> Option<String> {
        match DocumentStore::active_title(self.conn, doc_id) {
            Ok(title) => title,
            Err(error) => {
                warn!(doc_id, ?error, "failed to look up reference title");
                None
            }
        }
    }
}

struct Frame {
    node: OutlineNode,
    references: HashSet<String>,
}

impl Frame {
    fn new(node: OutlineNode) -> Self {
        Self { node, references: HashSet::new() }
    }
}

/// Build the outline of `document`. Every reference newly added to some
/// section is also appended to `collector`, once per target.
pub fn generate_outline(
    document: &Document,
    titles: &dyn TitleLookup,
    mut collector: Option<&mut Vec<String>>,
) -> OutlineNode {
    let mut root = Frame::new(OutlineNode {
        id: TITLE_NODE_ID.to_string(),
        title: display_title(&document.title_text()).to_string(),
        priority: TITLE_PRIORITY,
        node_type: OutlineNodeType::Normal,
        children: Vec::new(),
    });
    // Open heading sections, innermost last. The root is never popped.
    let mut open: Vec<Frame> = Vec::new();

    for block in &document.body {
        let precedence = block.text_type.precedence();
        if precedence > 0 {
            let title = block.content.to_plain_string();
            if title.is_empty() {
                continue;
            }

            while open.last().is_some_and(|frame| frame.node.priority > precedence) {
                close_innermost(&mut open, &mut root);
            }
            if open.last().is_some_and(|frame| frame.node.priority == precedence) {
                close_innermost(&mut open, &mut root);
            }
            open.push(Frame::new(OutlineNode {
                id: block.id.clone(),
                title,
                priority: precedence,
                node_type: OutlineNodeType::from_text_type(block.text_type),
                children: Vec::new(),
            }));
            continue;
        }

        for doc_id in block.content.references() {
            let Some(title) = titles.title_of(doc_id) else {
                continue;
            };
            let frame = match open.last_mut() {
                Some(frame) => frame,
                None => &mut root,
            };
            if !frame.references.insert(doc_id.to_string()) {
                continue;
            }
            frame
                .node
                .children
                .push(OutlineNode::reference(doc_id, display_title(&title).to_string()));

            if let Some(collected) = collector.as_deref_mut() {
                if !collected.iter().any(|existing| existing == doc_id) {
                    collected.push(doc_id.to_string());
                }
            }
        }
    }

    while !open.is_empty() {
        close_innermost(&mut open, &mut root);
    }
    root.node
}

/// Pop the innermost open section and attach it to its parent.
fn close_innermost(open: &mut Vec<Frame>, root: &mut Frame) {
    let Some(frame) = open.pop() else {
        return;
    };
    match open.last_mut() {
        Some(parent) => parent.node.children.push(frame.node),
        None => root.node.children.push(frame.node),
    }
}

#[cfg(test)]
mod tests {
    use quire_common::content::{Block, Delta, TextType};
    use quire_common::outline::REFERENCE_PRIORITY;

    use super::*;

    fn titles(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(id, title)| (id.to_string(), title.to_string())).collect()
    }

    fn heading(id: &str, text_type: TextType, text: &str) -> Block {
        Block::with_id(id, text_type, Delta::from_text(text))
    }

    fn paragraph_with_refs(id: &str, refs: &[&str]) -> Block {
        let mut delta = Delta::from_text("see ");
        for doc_id in refs {
            delta = delta.push_reference(doc_id);
        }
        Block::with_id(id, TextType::Normal, delta)
    }

    #[test]
    fn empty_title_renders_as_untitled() {
        let outline = generate_outline(&Document::new(), &HashMap::new(), None);
        assert_eq!(outline.id, "title");
        assert_eq!(outline.title, "Untitled document");
        assert_eq!(outline.priority, 0);
        assert!(outline.children.is_empty());
    }

    #[test]
    fn headings_nest_by_precedence() {
        let mut doc = Document::with_title("Plan");
        doc.body = vec![
            heading("Blk-1", TextType::Heading1, "One"),
            heading("Blk-2", TextType::Heading2, "One.A"),
            heading("Blk-3", TextType::Heading3, "One.A.i"),
            heading("Blk-4", TextType::Heading2, "One.B"),
            heading("Blk-5", TextType::Heading1, "Two"),
            paragraph_with_refs("Blk-6", &["Doc-y", "Doc-y"]),
        ];

        let outline = generate_outline(&doc, &titles(&[("Doc-y", "Y")]), None);
        assert_eq!(outline.title, "Plan");
        assert_eq!(outline.children.len(), 2);

        let one = &outline.children[0];
        assert_eq!(one.title, "One");
        assert_eq!(one.node_type, OutlineNodeType::Heading1);
        let one_children: Vec<&str> = one.children.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(one_children, vec!["One.A", "One.B"]);
        assert_eq!(one.children[0].children[0].title, "One.A.i");

        let two = &outline.children[1];
        assert_eq!(two.children.len(), 1, "duplicate reference should be dropped");
        assert_eq!(two.children[0].id, "Ref-Doc-y");
        assert_eq!(two.children[0].priority, REFERENCE_PRIORITY);
    }

    #[test]
    fn references_land_in_the_open_section_and_collector_sees_each_once() {
        let mut doc = Document::with_title("Hub");
        doc.body = vec![
            paragraph_with_refs("Blk-0", &["Doc-a"]),
            heading("Blk-1", TextType::Heading1, "Section"),
            paragraph_with_refs("Blk-2", &["Doc-a", "Doc-b"]),
        ];

        let mut collected = Vec::new();
        let outline = generate_outline(
            &doc,
            &titles(&[("Doc-a", "A"), ("Doc-b", "")]),
            Some(&mut collected),
        );

        assert_eq!(outline.children[0].id, "Ref-Doc-a");
        assert_eq!(outline.children[1].id, "Blk-1");
        let section_refs: Vec<&str> =
            outline.children[1].children.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(section_refs, vec!["Ref-Doc-a", "Ref-Doc-b"]);
        assert_eq!(outline.children[1].children[1].title, "Untitled document");

        assert_eq!(collected, vec!["Doc-a".to_string(), "Doc-b".to_string()]);
    }

    #[test]
    fn missing_targets_and_empty_headings_are_skipped() {
        let mut doc = Document::new();
        doc.body = vec![
            heading("Blk-1", TextType::Heading2, ""),
            paragraph_with_refs("Blk-2", &["Doc-gone"]),
        ];

        let mut collected = Vec::new();
        let outline = generate_outline(&doc, &HashMap::new(), Some(&mut collected));
        assert!(outline.children.is_empty());
        assert!(collected.is_empty());
    }

    #[test]
    fn shallower_heading_after_deep_one_closes_sections() {
        let mut doc = Document::new();
        doc.body = vec![
            heading("Blk-1", TextType::Heading3, "Deep"),
            heading("Blk-2", TextType::Heading2, "Mid"),
            heading("Blk-3", TextType::Heading1, "Top"),
        ];

        let outline = generate_outline(&doc, &HashMap::new(), None);
        let top_level: Vec<&str> = outline.children.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(top_level, vec!["Deep", "Mid", "Top"]);
    }
}
