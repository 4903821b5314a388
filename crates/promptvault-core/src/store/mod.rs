//! SQLite persistence engine.
//!
//! File stores run in WAL mode with one writer connection and one
//! query-only reader connection, so reads never queue behind a commit.
//! In-memory stores share a single connection between both roles.

mod context;
mod query;
mod row;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::{Result, VaultError};
use crate::fs::{create_private_file, ensure_private_dir, restrict_permissions, OWNER_FILE_MODE};
use crate::schema::{self, block, Entity, DELETED_AT};

pub use context::{CommitSummary, ReadContext, Snapshot, WriteContext};
pub use query::{FetchRequest, Predicate, SortDescriptor};
pub use row::{timestamp_value, uuid_value, Row};

use context::lock_conn;

/// Default time a connection waits on a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Tuning for [`Store::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// The schema-bound store.
pub struct Store {
    path: Option<PathBuf>,
    reader: Arc<Mutex<Connection>>,
    writer: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the store file at `path` and migrate it.
    pub fn open(path: &Path, options: &StoreOptions) -> Result<Self> {
        let started = Instant::now();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                ensure_private_dir(parent)?;
            }
        }

        if !path.exists() {
            create_private_file(path)?;
        }

        let mut writer = Connection::open(path)?;
        writer.busy_timeout(options.busy_timeout)?;
        // Refuse a newer store before any pragma rewrites its header.
        let found = schema::current_version(&writer)?;
        let supported = schema::latest_version();
        if found > supported {
            return Err(VaultError::UnsupportedSchemaVersion { found, supported });
        }
        let journal_mode: String =
            writer.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            warn!(path = %path.display(), journal_mode = %journal_mode, "Store is not in WAL mode");
        }
        writer.execute_batch(
            "PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL; PRAGMA secure_delete = ON;",
        )?;
        let version = schema::apply_migrations(&mut writer)?;

        let reader = Connection::open(path)?;
        reader.busy_timeout(options.busy_timeout)?;
        reader.execute_batch("PRAGMA foreign_keys = ON; PRAGMA query_only = ON;")?;

        for suffix in ["", "-wal", "-shm"] {
            let file = PathBuf::from(format!("{}{}", path.display(), suffix));
            if file.exists() {
                restrict_permissions(&file, OWNER_FILE_MODE)?;
            }
        }

        info!(
            path = %path.display(),
            mode = "file",
            schema_version = version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Opened store"
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
        })
    }

    /// Open a private in-memory store. Contents vanish on drop.
    pub fn open_in_memory() -> Result<Self> {
        let started = Instant::now();
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let version = schema::apply_migrations(&mut conn)?;
        info!(
            mode = "memory",
            schema_version = version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Opened store"
        );

        let shared = Arc::new(Mutex::new(conn));
        Ok(Self {
            path: None,
            reader: shared.clone(),
            writer: shared,
        })
    }

    /// Store file path; `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn read_context(&self) -> ReadContext {
        ReadContext::new(self.reader.clone())
    }

    pub fn new_write_context(&self) -> WriteContext {
        WriteContext::new(self.writer.clone())
    }

    pub fn schema_version(&self) -> Result<u32> {
        let conn = lock_conn(&self.reader)?;
        schema::current_version(&conn)
    }

    /// Verify SQLite page integrity, foreign keys, and that every live block
    /// carries ciphertext.
    pub fn check_integrity(&self) -> Result<()> {
        let conn = lock_conn(&self.reader)?;

        let status: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if status != "ok" {
            return Err(VaultError::Store(format!(
                "SQLite integrity check failed: {}",
                status
            )));
        }

        let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
        let mut rows = stmt.query([])?;
        if rows.next()?.is_some() {
            return Err(VaultError::Store(
                "Foreign key integrity check failed".to_string(),
            ));
        }

        let missing_content: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {table} WHERE {deleted} IS NULL AND ({content} IS NULL OR length({content}) = 0)",
                table = Entity::Block.table(),
                deleted = DELETED_AT,
                content = block::ENCRYPTED_CONTENT,
            ),
            [],
            |row| row.get(0),
        )?;
        if missing_content > 0 {
            return Err(VaultError::Store(format!(
                "{} live blocks have no encrypted content",
                missing_content
            )));
        }

        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("shared_connection", &Arc::ptr_eq(&self.reader, &self.writer))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{project, ID};
    use chrono::Utc;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn project_row(name: &str) -> Row {
        let mut row = Row::new(Entity::Project, Uuid::new_v4());
        row.set_text(project::NAME, Some(name)).unwrap();
        row.set_text(project::SUMMARY, Some("")).unwrap();
        row.set_timestamp(project::CREATED_AT, Some(Utc::now()))
            .unwrap();
        row
    }

    #[test]
    fn test_in_memory_shares_connection() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.path().is_none());
        assert!(format!("{:?}", store).contains("shared_connection: true"));
        assert_eq!(store.schema_version().unwrap(), schema::latest_version());
    }

    #[test]
    fn test_file_store_uses_wal_and_private_modes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("prompts.db");
        let store = Store::open(&path, &StoreOptions::default()).unwrap();

        let mode: String = {
            let conn = lock_conn(&store.writer).unwrap();
            conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(mode.to_lowercase(), "wal");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(file_mode, OWNER_FILE_MODE);
            let dir_mode = std::fs::metadata(path.parent().unwrap())
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(dir_mode, crate::fs::OWNER_DIR_MODE);
        }
    }

    #[test]
    fn test_reader_is_query_only() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("prompts.db"), &StoreOptions::default()).unwrap();
        let conn = lock_conn(&store.reader).unwrap();
        assert!(conn.execute("DELETE FROM projects", []).is_err());
    }

    #[test]
    fn test_commit_visible_to_next_read() {
        let store = Store::open_in_memory().unwrap();
        let row = project_row("Inbox");
        let id = row.id();

        let mut ctx = store.new_write_context();
        ctx.upsert(row).unwrap();
        let before = store
            .read_context()
            .perform(|snapshot| snapshot.fetch_one(Entity::Project, id))
            .unwrap();
        assert!(before.is_none());

        let summary = ctx.commit().unwrap();
        assert_eq!(summary.inserted, 1);

        let after = store
            .read_context()
            .perform(|snapshot| snapshot.fetch_one(Entity::Project, id))
            .unwrap()
            .unwrap();
        assert_eq!(after.text(project::NAME).unwrap().as_deref(), Some("Inbox"));
    }

    #[test]
    fn test_empty_commit_writes_nothing() {
        let store = Store::open_in_memory().unwrap();
        let mut ctx = store.new_write_context();
        ctx.fetch(&FetchRequest::new(Entity::Project)).unwrap();
        assert!(!ctx.has_changes());
        assert!(ctx.commit().unwrap().is_empty());
    }

    #[test]
    fn test_integrity_check_flags_block_without_content() {
        let store = Store::open_in_memory().unwrap();
        store.check_integrity().unwrap();

        let prompt_id = Uuid::new_v4();
        {
            let conn = lock_conn(&store.writer).unwrap();
            conn.execute(
                &format!("INSERT INTO prompts ({}) VALUES (?)", ID),
                [prompt_id.to_string()],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO blocks (id, prompt_id, order_index, type_tag) VALUES (?, ?, 0, 'text')",
                [Uuid::new_v4().to_string(), prompt_id.to_string()],
            )
            .unwrap();
        }
        let err = store.check_integrity().unwrap_err();
        assert!(err.to_string().contains("no encrypted content"));
    }
}
