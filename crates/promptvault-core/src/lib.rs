//! # Promptvault Core
//!
//! Encrypted persistence for a local-first prompt editor.
//!
//! Documents are stored as Project → Prompt → Block. Block content is the
//! only sensitive field: it is sealed with AES-256-GCM under a master key
//! held by a [`KeyStore`](security::KeyStore) and never reaches disk in
//! plaintext. Everything else is plaintext metadata.
//!
//! ## Architecture
//!
//! - **domain**: immutable aggregates (`Project`, `Prompt`, `Block`)
//! - **security**: key stores, the AEAD cipher, and the security service
//! - **schema**: entities, relationships, and migrations
//! - **store**: SQLite engine with read and write contexts
//! - **repository**: async `PromptRepository` with reconciliation and soft-delete
//! - **config** / **logging** / **vault**: configuration, tracing setup, wiring

pub mod config;
pub mod domain;
pub mod error;
pub mod fs;
pub mod logging;
pub mod repository;
pub mod schema;
pub mod security;
pub mod store;
pub mod vault;

pub use config::VaultConfig;
pub use domain::{Block, BlockContent, BlockKind, Project, Prompt, PromptSummary};
pub use error::{KeyStoreError, Result, VaultError};
pub use repository::{OrphanPolicy, PromptRepository, SqlitePromptRepository};
pub use security::{CryptoService, KeyStore, SecurityService, MASTER_KEY_ID};
pub use store::Store;
pub use vault::Vault;

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
