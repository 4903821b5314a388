//! The prompt repository: the only component the application talks to.

mod mapping;
mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Project, Prompt, PromptSummary};
use crate::error::Result;

pub use sqlite::SqlitePromptRepository;

/// What `save_prompt` does with persisted blocks missing from the incoming
/// prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Remove the rows.
    #[default]
    HardDelete,
    /// Stamp the rows as deleted and keep them.
    SoftDelete,
}

/// Persistence operations over projects and prompts.
///
/// Soft-deleted entities never appear in results; missing or deleted ids
/// read as `None` or an empty list rather than an error.
#[async_trait]
pub trait PromptRepository: Send + Sync {
    /// Live projects, newest first.
    async fn fetch_projects(&self) -> Result<Vec<Project>>;

    /// Insert or overwrite a project by id. Clears any soft-delete.
    async fn save_project(&self, project: Project) -> Result<()>;

    /// Soft-delete a project together with its live prompts and their live
    /// blocks. A missing project is a no-op.
    async fn delete_project(&self, id: Uuid) -> Result<()>;

    /// A live prompt with its live blocks decrypted.
    async fn fetch_prompt(&self, id: Uuid) -> Result<Option<Prompt>>;

    /// Persist `prompt` and reconcile its stored blocks with `prompt.blocks()`
    /// in one unit of work. A block id already owned by another prompt is
    /// rejected with `InvalidInput` and nothing is written.
    async fn save_prompt(&self, prompt: Prompt) -> Result<()>;

    /// Soft-delete a prompt and its current blocks with one timestamp. A
    /// missing prompt is a no-op.
    async fn delete_prompt(&self, id: Uuid) -> Result<()>;

    /// Undo [`delete_prompt`](PromptRepository::delete_prompt). Returns false
    /// if the prompt is missing or not deleted.
    async fn restore_prompt(&self, id: Uuid) -> Result<bool>;

    /// Live prompt metadata without decrypting content, most recently
    /// updated first. `None` lists prompts across all projects.
    async fn list_prompts(&self, project_id: Option<Uuid>) -> Result<Vec<PromptSummary>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orphan_policy_default_and_serde_names() {
        assert_eq!(OrphanPolicy::default(), OrphanPolicy::HardDelete);

        #[derive(Deserialize)]
        struct Wrapper {
            policy: OrphanPolicy,
        }
        let parsed: Wrapper = toml::from_str("policy = \"soft_delete\"").unwrap();
        assert_eq!(parsed.policy, OrphanPolicy::SoftDelete);
    }
}
