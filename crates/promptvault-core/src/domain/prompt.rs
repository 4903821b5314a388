//! Prompts: titled, ordered collections of blocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::block::Block;

/// A prompt aggregate.
///
/// `blocks` keeps whatever order the caller supplied; use
/// [`Prompt::ordered_blocks`] for presentation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    id: Uuid,
    project_id: Option<Uuid>,
    title: String,
    blocks: Vec<Block>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Prompt {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id: None,
            title: title.into(),
            blocks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a prompt with every field supplied, e.g. from storage.
    pub fn from_parts(
        id: Uuid,
        project_id: Option<Uuid>,
        title: impl Into<String>,
        blocks: Vec<Block>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            project_id,
            title: title.into(),
            blocks,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn project_id(&self) -> Option<Uuid> {
        self.project_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Blocks sorted ascending by order index. Ties keep their relative order.
    pub fn ordered_blocks(&self) -> Vec<&Block> {
        let mut ordered: Vec<&Block> = self.blocks.iter().collect();
        ordered.sort_by_key(|block| block.order_index());
        ordered
    }

    pub fn with_id(self, id: Uuid) -> Self {
        Self { id, ..self }
    }

    pub fn with_project(self, project_id: Option<Uuid>) -> Self {
        Self { project_id, ..self }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..self
        }
    }

    pub fn with_blocks(self, blocks: Vec<Block>) -> Self {
        Self { blocks, ..self }
    }

    /// Append a block after the current last position.
    pub fn with_block_appended(self, content: super::BlockContent) -> Self {
        let next = self
            .blocks
            .iter()
            .map(Block::order_index)
            .max()
            .map_or(0, |max| max + 1);
        let mut blocks = self.blocks;
        blocks.push(Block::new(content, next));
        Self { blocks, ..self }
    }

    pub fn without_block(self, block_id: Uuid) -> Self {
        let blocks = self
            .blocks
            .into_iter()
            .filter(|block| block.id() != block_id)
            .collect();
        Self { blocks, ..self }
    }

    pub fn with_created_at(self, created_at: DateTime<Utc>) -> Self {
        Self { created_at, ..self }
    }

    pub fn with_updated_at(self, updated_at: DateTime<Utc>) -> Self {
        Self { updated_at, ..self }
    }

    /// Stamp `updated_at` with the current time.
    pub fn touched(self) -> Self {
        self.with_updated_at(Utc::now())
    }
}

/// Metadata-only view of a prompt, produced without decrypting any block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSummary {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub block_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BlockContent;

    #[test]
    fn test_ordered_blocks_sorts_by_order_index() {
        let prompt = Prompt::new("Sorted").with_blocks(vec![
            Block::new(BlockContent::Text("third".into()), 30),
            Block::new(BlockContent::Text("first".into()), 1),
            Block::new(BlockContent::Text("second".into()), 7),
        ]);

        let raw: Vec<String> = prompt
            .ordered_blocks()
            .iter()
            .map(|block| block.content().raw_value())
            .collect();
        assert_eq!(raw, vec!["first", "second", "third"]);
        // Insertion order is untouched.
        assert_eq!(prompt.blocks()[0].content().raw_value(), "third");
    }

    #[test]
    fn test_ordered_blocks_is_stable_on_ties() {
        let a = Block::new(BlockContent::Text("a".into()), 2);
        let b = Block::new(BlockContent::Text("b".into()), 2);
        let prompt = Prompt::new("Ties").with_blocks(vec![a.clone(), b.clone()]);

        let ordered = prompt.ordered_blocks();
        assert_eq!(ordered[0].id(), a.id());
        assert_eq!(ordered[1].id(), b.id());
    }

    #[test]
    fn test_append_uses_next_position() {
        let prompt = Prompt::new("Append")
            .with_block_appended(BlockContent::Heading("Intro".into()))
            .with_block_appended(BlockContent::Separator);

        let indexes: Vec<i64> = prompt.blocks().iter().map(Block::order_index).collect();
        assert_eq!(indexes, vec![0, 1]);
    }

    #[test]
    fn test_without_block_removes_by_id() {
        let prompt = Prompt::new("Remove")
            .with_block_appended(BlockContent::Text("keep".into()))
            .with_block_appended(BlockContent::Text("drop".into()));
        let drop_id = prompt.blocks()[1].id();

        let trimmed = prompt.clone().without_block(drop_id);
        assert_eq!(trimmed.blocks().len(), 1);
        assert_eq!(prompt.blocks().len(), 2);
    }
}
