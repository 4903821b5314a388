//! Blocks: the ordered content units of a prompt.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical plaintext stored for separator blocks.
pub const SEPARATOR_SENTINEL: &str = "---";

const VARIABLE_OPEN: &str = "{{";
const VARIABLE_CLOSE: &str = "}}";

/// Content variants a block can hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BlockContent {
    /// A paragraph of text.
    Text(String),
    /// A structural heading.
    Heading(String),
    /// A visual separator; carries no payload.
    Separator,
    /// A reference to a named variable placeholder.
    Variable(String),
}

impl BlockContent {
    /// Plaintext representation that gets encrypted and persisted.
    pub fn raw_value(&self) -> String {
        match self {
            BlockContent::Text(value) | BlockContent::Heading(value) => value.clone(),
            BlockContent::Separator => SEPARATOR_SENTINEL.to_string(),
            BlockContent::Variable(name) => format!("{}{}{}", VARIABLE_OPEN, name, VARIABLE_CLOSE),
        }
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            BlockContent::Text(_) => BlockKind::Text,
            BlockContent::Heading(_) => BlockKind::Heading,
            BlockContent::Separator => BlockKind::Separator,
            BlockContent::Variable(_) => BlockKind::Variable,
        }
    }

    /// Rebuild content from a persisted type tag and its decrypted plaintext.
    ///
    /// Separator plaintext is ignored; variable plaintext loses its `{{ }}`
    /// delimiters; text and heading plaintext is kept verbatim.
    pub fn from_plaintext(kind: BlockKind, plaintext: String) -> Self {
        match kind {
            BlockKind::Separator => BlockContent::Separator,
            BlockKind::Variable => BlockContent::Variable(strip_delimiters(&plaintext)),
            BlockKind::Heading => BlockContent::Heading(plaintext),
            BlockKind::Text => BlockContent::Text(plaintext),
        }
    }
}

fn strip_delimiters(value: &str) -> String {
    let trimmed = value.strip_prefix(VARIABLE_OPEN).unwrap_or(value);
    let trimmed = trimmed.strip_suffix(VARIABLE_CLOSE).unwrap_or(trimmed);
    trimmed.to_string()
}

/// Persisted type tag of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Heading,
    Separator,
    Variable,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Text => "text",
            BlockKind::Heading => "heading",
            BlockKind::Separator => "separator",
            BlockKind::Variable => "variable",
        }
    }

    /// Parse a stored tag; unknown tags read as `Text`.
    pub fn from_tag(tag: &str) -> Self {
        tag.parse().unwrap_or(BlockKind::Text)
    }
}

impl FromStr for BlockKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(BlockKind::Text),
            "heading" => Ok(BlockKind::Heading),
            "separator" => Ok(BlockKind::Separator),
            "variable" => Ok(BlockKind::Variable),
            other => Err(format!("Unknown block type tag: {}", other)),
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single content unit within a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    id: Uuid,
    content: BlockContent,
    order_index: i64,
}

impl Block {
    pub fn new(content: BlockContent, order_index: i64) -> Self {
        Self::with_id(Uuid::new_v4(), content, order_index)
    }

    pub fn with_id(id: Uuid, content: BlockContent, order_index: i64) -> Self {
        Self {
            id,
            content,
            order_index,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn content(&self) -> &BlockContent {
        &self.content
    }

    pub fn order_index(&self) -> i64 {
        self.order_index
    }

    /// Copy of this block with new content.
    pub fn with_content(&self, content: BlockContent) -> Self {
        Self {
            content,
            ..self.clone()
        }
    }

    /// Copy of this block at a new position.
    pub fn with_order_index(&self, order_index: i64) -> Self {
        Self {
            order_index,
            ..self.clone()
        }
    }
}
