//! Translation between domain aggregates and store rows.
//!
//! Rows that cannot be assembled into an aggregate (missing or malformed
//! fields) are skipped with a warning. Decryption failures are not: they
//! propagate to the caller.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::domain::{Block, BlockContent, BlockKind, Project, Prompt, PromptSummary};
use crate::error::Result;
use crate::schema::{block, project, prompt, DELETED_AT};
use crate::security::SecurityService;
use crate::store::Row;

fn skip<T>(row: &Row, outcome: Result<Option<T>>) -> Option<T> {
    match outcome {
        Ok(Some(value)) => Some(value),
        Ok(None) => {
            warn!(entity = %row.entity(), id = %row.id(), "Skipping row with missing fields");
            None
        }
        Err(err) => {
            warn!(entity = %row.entity(), id = %row.id(), error = %err, "Skipping unreadable row");
            None
        }
    }
}

pub(crate) fn project_from_row(row: &Row) -> Option<Project> {
    let read = || -> Result<Option<Project>> {
        let (Some(name), Some(created_at)) = (
            row.text(project::NAME)?,
            row.timestamp(project::CREATED_AT)?,
        ) else {
            return Ok(None);
        };
        let summary = row.text(project::SUMMARY)?.unwrap_or_default();
        Ok(Some(Project::from_parts(row.id(), name, summary, created_at)))
    };
    skip(row, read())
}

/// Prompt metadata read from a row; blocks are attached separately.
pub(crate) struct PromptHeader {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromptHeader {
    pub fn into_prompt(self, blocks: Vec<Block>) -> Prompt {
        Prompt::from_parts(
            self.id,
            self.project_id,
            self.title,
            blocks,
            self.created_at,
            self.updated_at,
        )
    }

    pub fn into_summary(self, block_count: usize) -> PromptSummary {
        PromptSummary {
            id: self.id,
            project_id: self.project_id,
            title: self.title,
            block_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub(crate) fn prompt_header_from_row(row: &Row) -> Option<PromptHeader> {
    let read = || -> Result<Option<PromptHeader>> {
        let (Some(title), Some(created_at), Some(updated_at)) = (
            row.text(prompt::TITLE)?,
            row.timestamp(prompt::CREATED_AT)?,
            row.timestamp(prompt::UPDATED_AT)?,
        ) else {
            return Ok(None);
        };
        Ok(Some(PromptHeader {
            id: row.id(),
            project_id: row.uuid(prompt::PROJECT_ID)?,
            title,
            created_at,
            updated_at,
        }))
    };
    skip(row, read())
}

/// Decrypt and rebuild a block. `Ok(None)` means the row was skipped.
pub(crate) fn block_from_row(row: &Row, security: &dyn SecurityService) -> Result<Option<Block>> {
    let read = || -> Result<Option<(i64, String, Vec<u8>)>> {
        let (Some(order_index), Some(tag), Some(ciphertext)) = (
            row.integer(block::ORDER_INDEX)?,
            row.text(block::TYPE_TAG)?,
            row.blob(block::ENCRYPTED_CONTENT)?,
        ) else {
            return Ok(None);
        };
        Ok(Some((order_index, tag, ciphertext)))
    };
    let Some((order_index, tag, ciphertext)) = skip(row, read()) else {
        return Ok(None);
    };

    let plaintext = security.decrypt(&ciphertext)?;
    let content = BlockContent::from_plaintext(BlockKind::from_tag(&tag), plaintext);
    Ok(Some(Block::with_id(row.id(), content, order_index)))
}

pub(crate) fn apply_project(row: &mut Row, value: &Project) -> Result<()> {
    row.set_text(project::NAME, Some(value.name()))?;
    row.set_text(project::SUMMARY, Some(value.summary()))?;
    row.set_timestamp(project::CREATED_AT, Some(value.created_at()))?;
    row.set_timestamp(DELETED_AT, None)
}

pub(crate) fn apply_prompt(row: &mut Row, value: &Prompt) -> Result<()> {
    row.set_uuid(prompt::PROJECT_ID, value.project_id())?;
    row.set_text(prompt::TITLE, Some(value.title()))?;
    row.set_timestamp(prompt::CREATED_AT, Some(value.created_at()))?;
    row.set_timestamp(prompt::UPDATED_AT, Some(value.updated_at()))?;
    row.set_timestamp(DELETED_AT, None)
}

/// Fill a block row, sealing the block's plaintext.
pub(crate) fn apply_block(
    row: &mut Row,
    value: &Block,
    prompt_id: Uuid,
    security: &dyn SecurityService,
) -> Result<()> {
    let ciphertext = security.encrypt(&value.content().raw_value())?;
    row.set_uuid(block::PROMPT_ID, Some(prompt_id))?;
    row.set_integer(block::ORDER_INDEX, value.order_index())?;
    row.set_text(block::TYPE_TAG, Some(value.content().kind().as_str()))?;
    row.set_blob(block::ENCRYPTED_CONTENT, ciphertext)?;
    row.set_timestamp(DELETED_AT, None)
}
