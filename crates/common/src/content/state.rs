use super::changeset::{Changeset, Operation, RejectReason, TextTarget};
use super::delta::{Delta, Insert};
use super::document::Document;

/// A content tree together with the version of the last changeset applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentState {
    document: Document,
    applied_version: i64,
}

impl ContentState {
    pub fn new(document: Document, applied_version: i64) -> Self {
        Self { document, applied_version }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn applied_version(&self) -> i64 {
        self.applied_version
    }

    /// Apply every operation or none of them. Only the changeset for exactly
    /// `applied_version + 1` is accepted.
    pub fn apply(&mut self, changeset: &Changeset) -> Result<(), RejectReason> {
        if changeset.version <= self.applied_version {
            return Err(RejectReason::StaleVersion {
                version: changeset.version,
                applied: self.applied_version,
            });
        }
        if changeset.version > self.applied_version + 1 {
            return Err(RejectReason::VersionGap {
                version: changeset.version,
                applied: self.applied_version,
            });
        }
        if changeset.operations.is_empty() {
            return Err(RejectReason::Empty);
        }

        let mut draft = self.document.clone();
        for operation in &changeset.operations {
            apply_operation(&mut draft, operation)?;
        }

        self.document = draft;
        self.applied_version = changeset.version;
        Ok(())
    }
}

fn apply_operation(document: &mut Document, operation: &Operation) -> Result<(), RejectReason> {
    match operation {
        Operation::InsertBlock { after, block } => {
            if document.block(&block.id).is_some() {
                return Err(RejectReason::DuplicateBlock { id: block.id.clone() });
            }
            let position = match after {
                Some(after_id) => {
                    document
                        .block_index(after_id)
                        .ok_or_else(|| RejectReason::UnknownBlock { id: after_id.clone() })?
                        + 1
                }
                None => 0,
            };
            document.body.insert(position, block.clone());
        }
        Operation::RemoveBlock { id } => {
            let position = document
                .block_index(id)
                .ok_or_else(|| RejectReason::UnknownBlock { id: id.clone() })?;
            document.body.remove(position);
        }
        Operation::SetTextType { id, text_type } => {
            let block =
                document.block_mut(id).ok_or_else(|| RejectReason::UnknownBlock { id: id.clone() })?;
            block.text_type = *text_type;
        }
        Operation::InsertText { target, index, text } => {
            text_mut(document, target)?.insert(*index, Insert::Text(text.clone()))?;
        }
        Operation::InsertEmbed { target, index, embed } => {
            text_mut(document, target)?.insert(*index, Insert::Embed(embed.clone()))?;
        }
        Operation::DeleteText { target, index, len } => {
            text_mut(document, target)?.delete(*index, *len)?;
        }
    }
    Ok(())
}

fn text_mut<'a>(
    document: &'a mut Document,
    target: &TextTarget,
) -> Result<&'a mut Delta, RejectReason> {
    match target {
        TextTarget::Title => Ok(&mut document.title),
        TextTarget::Block { id } => document
            .block_mut(id)
            .map(|block| &mut block.content)
            .ok_or_else(|| RejectReason::UnknownBlock { id: id.clone() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::delta::Embed;
    use crate::content::document::{Block, TextType};

    fn title_edit(version: i64, text: &str) -> Changeset {
        Changeset::new(version).with_operation(Operation::InsertText {
            target: TextTarget::Title,
            index: 0,
            text: text.into(),
        })
    }

    #[test]
    fn apply_advances_version_and_edits_tree() {
        let mut state = ContentState::new(Document::new(), 0);
        state.apply(&title_edit(1, "Home")).expect("first changeset applies");

        let insert_block = Changeset::new(2)
            .with_operation(Operation::InsertBlock {
                after: None,
                block: Block::with_id("Blk-a", TextType::Normal, Delta::from_text("see ")),
            })
            .with_operation(Operation::InsertEmbed {
                target: TextTarget::block("Blk-a"),
                index: 4,
                embed: Embed::Reference { doc_id: "Doc-b".into() },
            });
        state.apply(&insert_block).expect("second changeset applies");

        assert_eq!(state.applied_version(), 2);
        assert_eq!(state.document().title_text(), "Home");
        let block = state.document().block("Blk-a").unwrap();
        assert_eq!(block.content.references().collect::<Vec<_>>(), vec!["Doc-b"]);
    }

    #[test]
    fn stale_and_gapped_versions_are_rejected() {
        let mut state = ContentState::new(Document::new(), 4);

        assert_eq!(
            state.apply(&title_edit(4, "x")),
            Err(RejectReason::StaleVersion { version: 4, applied: 4 })
        );
        assert_eq!(
            state.apply(&title_edit(6, "x")),
            Err(RejectReason::VersionGap { version: 6, applied: 4 })
        );
        assert_eq!(state.applied_version(), 4);
    }

    #[test]
    fn failing_operation_rolls_back_whole_changeset() {
        let mut state = ContentState::new(Document::with_title("Keep"), 0);
        let changeset = title_edit(1, "Lost ").with_operation(Operation::RemoveBlock {
            id: "Blk-missing".into(),
        });

        let err = state.apply(&changeset).unwrap_err();
        assert_eq!(err, RejectReason::UnknownBlock { id: "Blk-missing".into() });
        assert_eq!(state.document().title_text(), "Keep");
        assert_eq!(state.applied_version(), 0);
    }

    #[test]
    fn duplicate_block_ids_are_rejected() {
        let block = Block::with_id("Blk-1", TextType::Normal, Delta::new());
        let mut state = ContentState::new(Document::new(), 0);
        state
            .apply(&Changeset::new(1).with_operation(Operation::InsertBlock {
                after: None,
                block: block.clone(),
            }))
            .unwrap();

        let err = state
            .apply(&Changeset::new(2).with_operation(Operation::InsertBlock {
                after: Some("Blk-1".into()),
                block,
            }))
            .unwrap_err();
        assert_eq!(err, RejectReason::DuplicateBlock { id: "Blk-1".into() });
    }

    #[test]
    fn empty_changeset_is_a_rejected_no_op() {
        let mut state = ContentState::new(Document::new(), 0);
        assert_eq!(state.apply(&Changeset::new(1)), Err(RejectReason::Empty));
    }
}
