//! Domain aggregates.
//!
//! These are immutable values: every edit returns a new aggregate. They carry
//! no storage or encryption concerns; the repository owns the translation to
//! and from persisted rows.

pub mod block;
pub mod project;
pub mod prompt;

pub use block::{Block, BlockContent, BlockKind, SEPARATOR_SENTINEL};
pub use project::Project;
pub use prompt::{Prompt, PromptSummary};
