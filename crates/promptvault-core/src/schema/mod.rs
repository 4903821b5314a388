//! Relational shape of the store.
//!
//! Entities, their columns, the ownership relationships between them, and
//! the ordered migrations that create them. The persistence engine is
//! generic over this description: it never hard-codes a table name.

mod migrations;

use std::fmt;

pub use migrations::{apply_migrations, latest_version};
pub(crate) use migrations::current_version;

/// A persisted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entity {
    Project,
    Prompt,
    Block,
}

impl Entity {
    /// All entities, owners before the entities they own.
    pub const ALL: [Entity; 3] = [Entity::Project, Entity::Prompt, Entity::Block];

    pub fn table(&self) -> &'static str {
        match self {
            Entity::Project => "projects",
            Entity::Prompt => "prompts",
            Entity::Block => "blocks",
        }
    }

    pub fn columns(&self) -> &'static [Column] {
        match self {
            Entity::Project => PROJECT_COLUMNS,
            Entity::Prompt => PROMPT_COLUMNS,
            Entity::Block => BLOCK_COLUMNS,
        }
    }

    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns().iter().find(|column| column.name == name)
    }

    /// Distance from the root of the ownership tree.
    pub fn depth(&self) -> usize {
        match self {
            Entity::Project => 0,
            Entity::Prompt => 1,
            Entity::Block => 2,
        }
    }

    /// The relationship pointing at this entity's owner, if any.
    pub fn owner(&self) -> Option<&'static Relationship> {
        RELATIONSHIPS
            .iter()
            .find(|relationship| relationship.child == *self)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// UUID stored as hyphenated text.
    Uuid,
    Text,
    Integer,
    /// RFC 3339 UTC timestamp stored as text.
    Timestamp,
    Blob,
}

/// A column of an entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Whether the domain mapping needs a value to assemble the entity.
    pub required: bool,
}

const fn column(name: &'static str, kind: ColumnKind, required: bool) -> Column {
    Column {
        name,
        kind,
        required,
    }
}

/// Primary key column shared by every entity.
pub const ID: &str = "id";

/// Soft-delete marker shared by every entity.
pub const DELETED_AT: &str = "deleted_at";

pub mod project {
    pub const NAME: &str = "name";
    pub const SUMMARY: &str = "summary";
    pub const CREATED_AT: &str = "created_at";
}

pub mod prompt {
    pub const PROJECT_ID: &str = "project_id";
    pub const TITLE: &str = "title";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

pub mod block {
    pub const PROMPT_ID: &str = "prompt_id";
    pub const ORDER_INDEX: &str = "order_index";
    pub const TYPE_TAG: &str = "type_tag";
    pub const ENCRYPTED_CONTENT: &str = "encrypted_content";
}

const PROJECT_COLUMNS: &[Column] = &[
    column(ID, ColumnKind::Uuid, true),
    column(project::NAME, ColumnKind::Text, true),
    column(project::SUMMARY, ColumnKind::Text, false),
    column(project::CREATED_AT, ColumnKind::Timestamp, true),
    column(DELETED_AT, ColumnKind::Timestamp, false),
];

const PROMPT_COLUMNS: &[Column] = &[
    column(ID, ColumnKind::Uuid, true),
    column(prompt::PROJECT_ID, ColumnKind::Uuid, false),
    column(prompt::TITLE, ColumnKind::Text, true),
    column(prompt::CREATED_AT, ColumnKind::Timestamp, true),
    column(prompt::UPDATED_AT, ColumnKind::Timestamp, true),
    column(DELETED_AT, ColumnKind::Timestamp, false),
];

const BLOCK_COLUMNS: &[Column] = &[
    column(ID, ColumnKind::Uuid, true),
    column(block::PROMPT_ID, ColumnKind::Uuid, true),
    column(block::ORDER_INDEX, ColumnKind::Integer, true),
    column(block::TYPE_TAG, ColumnKind::Text, true),
    column(block::ENCRYPTED_CONTENT, ColumnKind::Blob, true),
    column(DELETED_AT, ColumnKind::Timestamp, false),
];

/// What happens to the other side when one side of a relationship is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteRule {
    /// Delete the owned rows too.
    Cascade,
    /// Leave the other side in place and clear the link.
    Nullify,
}

/// Ownership relationship between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    pub parent: Entity,
    pub child: Entity,
    /// Column on the child holding the parent's id.
    pub foreign_key: &'static str,
    /// Applied to children when the parent is hard-deleted.
    pub delete_rule: DeleteRule,
    /// Whether a child row must always reference a parent.
    pub child_required: bool,
}

pub const RELATIONSHIPS: &[Relationship] = &[
    Relationship {
        parent: Entity::Project,
        child: Entity::Prompt,
        foreign_key: prompt::PROJECT_ID,
        delete_rule: DeleteRule::Cascade,
        child_required: false,
    },
    Relationship {
        parent: Entity::Prompt,
        child: Entity::Block,
        foreign_key: block::PROMPT_ID,
        delete_rule: DeleteRule::Cascade,
        child_required: true,
    },
];
