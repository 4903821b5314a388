//! [`PromptRepository`] over the SQLite store.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Project, Prompt, PromptSummary};
use crate::error::{Result, VaultError};
use crate::schema::{block, project, prompt, Entity, DELETED_AT};
use crate::security::SecurityService;
use crate::store::{
    timestamp_value, FetchRequest, Predicate, Row, SortDescriptor, Store, WriteContext,
};

use super::mapping::{
    apply_block, apply_project, apply_prompt, block_from_row, project_from_row,
    prompt_header_from_row,
};
use super::{OrphanPolicy, PromptRepository};

/// Repository that runs every unit of work on the blocking pool.
///
/// Reads go through the store's read context, writes through a fresh write
/// context per call. A spawned unit of work runs to completion even if the
/// awaiting future is dropped.
#[derive(Clone)]
pub struct SqlitePromptRepository {
    store: Arc<Store>,
    security: Arc<dyn SecurityService>,
    orphan_policy: OrphanPolicy,
}

impl SqlitePromptRepository {
    pub fn new(store: Arc<Store>, security: Arc<dyn SecurityService>) -> Self {
        Self {
            store,
            security,
            orphan_policy: OrphanPolicy::default(),
        }
    }

    pub fn with_orphan_policy(mut self, orphan_policy: OrphanPolicy) -> Self {
        self.orphan_policy = orphan_policy;
        self
    }

    pub fn orphan_policy(&self) -> OrphanPolicy {
        self.orphan_policy
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    async fn run<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store, &dyn SecurityService, OrphanPolicy) -> Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        let security = self.security.clone();
        let policy = self.orphan_policy;
        tokio::task::spawn_blocking(move || work(&store, security.as_ref(), policy))
            .await
            .map_err(|e| VaultError::Store(format!("Repository task failed: {}", e)))?
    }
}

impl std::fmt::Debug for SqlitePromptRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePromptRepository")
            .field("store", &self.store)
            .field("orphan_policy", &self.orphan_policy)
            .finish_non_exhaustive()
    }
}

fn blocks_of(prompt_id: Uuid) -> FetchRequest {
    FetchRequest::new(Entity::Block).filter(Predicate::eq_uuid(block::PROMPT_ID, prompt_id))
}

fn is_deleted(row: &Row) -> Result<bool> {
    Ok(!row.is_null(DELETED_AT)?)
}

/// Stamp every row `request` yields with `at`.
fn stamp_deleted(ctx: &mut WriteContext, request: &FetchRequest, at: DateTime<Utc>) -> Result<usize> {
    let rows = ctx.fetch(request)?;
    let count = rows.len();
    for mut row in rows {
        row.set_timestamp(DELETED_AT, Some(at))?;
        ctx.upsert(row)?;
    }
    Ok(count)
}

fn save_prompt_blocking(
    store: &Store,
    security: &dyn SecurityService,
    policy: OrphanPolicy,
    value: &Prompt,
) -> Result<()> {
    let mut ctx = store.new_write_context();
    let prompt_id = value.id();

    let mut prompt_row = ctx
        .get(Entity::Prompt, prompt_id)?
        .unwrap_or_else(|| Row::new(Entity::Prompt, prompt_id));
    apply_prompt(&mut prompt_row, value)?;
    ctx.upsert(prompt_row)?;

    let persisted = ctx.fetch(&blocks_of(prompt_id))?;
    let owned: HashSet<Uuid> = persisted.iter().map(Row::id).collect();

    let mut incoming = HashSet::with_capacity(value.blocks().len());
    for item in value.blocks() {
        incoming.insert(item.id());
        let mut row = match ctx.get(Entity::Block, item.id())? {
            None => Row::new(Entity::Block, item.id()),
            Some(row) if owned.contains(&item.id()) => row,
            // Staged earlier in this save under the same id.
            Some(row) if row.uuid(block::PROMPT_ID)? == Some(prompt_id) => row,
            Some(row) => {
                return Err(VaultError::InvalidInput(format!(
                    "Block {} belongs to prompt {}",
                    item.id(),
                    row.uuid(block::PROMPT_ID)?
                        .map_or_else(|| "none".to_string(), |id| id.to_string())
                )));
            }
        };
        apply_block(&mut row, item, prompt_id, security)?;
        ctx.upsert(row)?;
    }

    let now = Utc::now();
    let mut orphans = 0;
    for row in persisted {
        if incoming.contains(&row.id()) {
            continue;
        }
        match policy {
            OrphanPolicy::HardDelete => ctx.delete(Entity::Block, row.id())?,
            OrphanPolicy::SoftDelete => {
                if is_deleted(&row)? {
                    continue;
                }
                let mut row = row;
                row.set_timestamp(DELETED_AT, Some(now))?;
                ctx.upsert(row)?;
            }
        }
        orphans += 1;
    }

    let summary = ctx.commit()?;
    debug!(
        prompt_id = %prompt_id,
        blocks = value.blocks().len(),
        orphans,
        inserted = summary.inserted,
        updated = summary.updated,
        deleted = summary.deleted,
        "Saved prompt"
    );
    Ok(())
}

#[async_trait]
impl PromptRepository for SqlitePromptRepository {
    async fn fetch_projects(&self) -> Result<Vec<Project>> {
        self.run(|store, _, _| {
            let request = FetchRequest::new(Entity::Project)
                .filter(Predicate::live())
                .sort_by(SortDescriptor::descending(project::CREATED_AT));
            let rows = store.read_context().perform(|snapshot| snapshot.fetch(&request))?;
            Ok(rows.iter().filter_map(project_from_row).collect())
        })
        .await
    }

    async fn save_project(&self, value: Project) -> Result<()> {
        self.run(move |store, _, _| {
            let mut ctx = store.new_write_context();
            let mut row = ctx
                .get(Entity::Project, value.id())?
                .unwrap_or_else(|| Row::new(Entity::Project, value.id()));
            apply_project(&mut row, &value)?;
            ctx.upsert(row)?;
            ctx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_project(&self, id: Uuid) -> Result<()> {
        self.run(move |store, _, _| {
            let mut ctx = store.new_write_context();
            let Some(mut row) = ctx.get(Entity::Project, id)? else {
                return Ok(());
            };
            if is_deleted(&row)? {
                return Ok(());
            }

            let now = Utc::now();
            row.set_timestamp(DELETED_AT, Some(now))?;
            ctx.upsert(row)?;

            let prompts = ctx.fetch(
                &FetchRequest::new(Entity::Prompt)
                    .filter(Predicate::eq_uuid(prompt::PROJECT_ID, id))
                    .filter(Predicate::live()),
            )?;
            let mut blocks = 0;
            for mut prompt_row in prompts.clone() {
                prompt_row.set_timestamp(DELETED_AT, Some(now))?;
                ctx.upsert(prompt_row)?;
            }
            for prompt_row in &prompts {
                blocks += stamp_deleted(
                    &mut ctx,
                    &blocks_of(prompt_row.id()).filter(Predicate::live()),
                    now,
                )?;
            }

            ctx.commit()?;
            info!(project_id = %id, prompts = prompts.len(), blocks, "Soft-deleted project");
            Ok(())
        })
        .await
    }

    async fn fetch_prompt(&self, id: Uuid) -> Result<Option<Prompt>> {
        self.run(move |store, security, _| {
            store.read_context().perform(|snapshot| {
                let Some(row) = snapshot.fetch_one(Entity::Prompt, id)? else {
                    return Ok(None);
                };
                if is_deleted(&row)? {
                    return Ok(None);
                }
                let Some(header) = prompt_header_from_row(&row) else {
                    return Ok(None);
                };

                let block_rows = snapshot.fetch(
                    &blocks_of(id)
                        .filter(Predicate::live())
                        .sort_by(SortDescriptor::ascending(block::ORDER_INDEX)),
                )?;
                let mut blocks = Vec::with_capacity(block_rows.len());
                for block_row in &block_rows {
                    if let Some(item) = block_from_row(block_row, security)? {
                        blocks.push(item);
                    }
                }
                Ok(Some(header.into_prompt(blocks)))
            })
        })
        .await
    }

    async fn save_prompt(&self, value: Prompt) -> Result<()> {
        self.run(move |store, security, policy| {
            save_prompt_blocking(store, security, policy, &value)
        })
        .await
    }

    async fn delete_prompt(&self, id: Uuid) -> Result<()> {
        self.run(move |store, _, _| {
            let mut ctx = store.new_write_context();
            let Some(mut row) = ctx.get(Entity::Prompt, id)? else {
                return Ok(());
            };
            if is_deleted(&row)? {
                return Ok(());
            }

            let now = Utc::now();
            row.set_timestamp(DELETED_AT, Some(now))?;
            ctx.upsert(row)?;
            let blocks = stamp_deleted(&mut ctx, &blocks_of(id).filter(Predicate::live()), now)?;

            ctx.commit()?;
            info!(prompt_id = %id, blocks, "Soft-deleted prompt");
            Ok(())
        })
        .await
    }

    async fn restore_prompt(&self, id: Uuid) -> Result<bool> {
        self.run(move |store, _, _| {
            let mut ctx = store.new_write_context();
            let Some(mut row) = ctx.get(Entity::Prompt, id)? else {
                return Ok(false);
            };
            let Some(stamp) = row.timestamp(DELETED_AT)? else {
                return Ok(false);
            };

            row.set_timestamp(DELETED_AT, None)?;
            ctx.upsert(row)?;

            let stamped = ctx.fetch(
                &blocks_of(id).filter(Predicate::eq(DELETED_AT, timestamp_value(stamp))),
            )?;
            let blocks = stamped.len();
            for mut block_row in stamped {
                block_row.set_timestamp(DELETED_AT, None)?;
                ctx.upsert(block_row)?;
            }

            ctx.commit()?;
            info!(prompt_id = %id, blocks, "Restored prompt");
            Ok(true)
        })
        .await
    }

    async fn list_prompts(&self, project_id: Option<Uuid>) -> Result<Vec<PromptSummary>> {
        self.run(move |store, _, _| {
            store.read_context().perform(|snapshot| {
                let mut request = FetchRequest::new(Entity::Prompt).filter(Predicate::live());
                if let Some(project_id) = project_id {
                    request = request.filter(Predicate::eq_uuid(prompt::PROJECT_ID, project_id));
                }
                let request = request.sort_by(SortDescriptor::descending(prompt::UPDATED_AT));

                let mut summaries = Vec::new();
                for row in snapshot.fetch(&request)? {
                    let Some(header) = prompt_header_from_row(&row) else {
                        continue;
                    };
                    let block_count =
                        snapshot.count(&blocks_of(header.id).filter(Predicate::live()))?;
                    summaries.push(header.into_summary(block_count));
                }
                Ok(summaries)
            })
        })
        .await
    }
}
