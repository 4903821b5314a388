//! Units of work over the store.
//!
//! A [`ReadContext`] evaluates fetches against one committed snapshot. A
//! [`WriteContext`] stages inserts, updates and deletes in memory and
//! applies them in a single transaction on [`WriteContext::commit`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::schema::{DeleteRule, Entity, Relationship, ID, RELATIONSHIPS};

use super::query::{select_columns, FetchRequest};
use super::row::{uuid_value, value_fits, Row};

pub(crate) fn lock_conn(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| VaultError::Store("SQLite connection poisoned".to_string()))
}

fn query_rows(conn: &Connection, request: &FetchRequest, with_limit: bool) -> Result<Vec<Row>> {
    request.validate()?;
    let (sql, params) = request.to_sql(with_limit);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;

    let mut fetched = Vec::new();
    while let Some(sql_row) = rows.next()? {
        match Row::from_sql(request.entity(), sql_row) {
            Ok(row) => fetched.push(row),
            Err(VaultError::Sqlite { source }) => return Err(source.into()),
            Err(err) => {
                warn!(entity = %request.entity(), error = %err, "Skipping unreadable row");
            }
        }
    }
    Ok(fetched)
}

fn query_by_id(conn: &Connection, entity: Entity, id: Uuid) -> Result<Option<Row>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?",
        select_columns(entity),
        entity.table(),
        ID
    );
    conn.query_row(&sql, [uuid_value(id)], |sql_row| {
        Ok(Row::from_sql(entity, sql_row))
    })
    .optional()?
    .transpose()
}

/// Read-only view of one committed snapshot.
pub struct Snapshot<'a> {
    conn: &'a Connection,
}

impl Snapshot<'_> {
    pub fn fetch(&self, request: &FetchRequest) -> Result<Vec<Row>> {
        query_rows(self.conn, request, true)
    }

    pub fn fetch_one(&self, entity: Entity, id: Uuid) -> Result<Option<Row>> {
        query_by_id(self.conn, entity, id)
    }

    pub fn count(&self, request: &FetchRequest) -> Result<usize> {
        Ok(self.fetch(request)?.len())
    }
}

/// Context for reads.
///
/// Each [`perform`](ReadContext::perform) opens a read transaction, so all
/// fetches inside it agree with each other, and commits made by write
/// contexts become visible at the next call.
#[derive(Clone)]
pub struct ReadContext {
    conn: Arc<Mutex<Connection>>,
}

impl ReadContext {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn perform<T>(&self, work: impl FnOnce(&Snapshot<'_>) -> Result<T>) -> Result<T> {
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let output = work(&Snapshot { conn: &tx })?;
        // Nothing to keep; ending the transaction releases the snapshot.
        tx.rollback()?;
        Ok(output)
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    /// Committed state when first registered; `None` for new rows.
    original: Option<Row>,
    /// Staged state; `None` for a staged delete.
    current: Option<Row>,
}

impl Tracked {
    fn is_modified(&self) -> bool {
        self.original != self.current
    }
}

/// Counts of what a commit wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Rows removed by hard deletes, cascaded rows included.
    pub deleted: usize,
}

impl CommitSummary {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Isolated unit of work.
///
/// Rows this context has fetched or staged are registered with it. Later
/// fetches return the registered version, overlaid with staged changes,
/// until [`refresh`](WriteContext::refresh) forgets unmodified rows.
/// Dropping the context without committing discards every staged change.
pub struct WriteContext {
    conn: Arc<Mutex<Connection>>,
    tracked: HashMap<(Entity, Uuid), Tracked>,
}

impl WriteContext {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            tracked: HashMap::new(),
        }
    }

    /// Committed rows matching `request`, with this context's staged
    /// changes applied.
    pub fn fetch(&mut self, request: &FetchRequest) -> Result<Vec<Row>> {
        let committed = {
            let conn = lock_conn(&self.conn)?;
            query_rows(&conn, request, false)?
        };

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for row in committed {
            let key = (row.entity(), row.id());
            seen.insert(key);
            let tracked = self.tracked.entry(key).or_insert_with(|| Tracked {
                original: Some(row.clone()),
                current: Some(row),
            });
            if let Some(current) = &tracked.current {
                if request.matches(current)? {
                    rows.push(current.clone());
                }
            }
        }

        for (key, tracked) in &self.tracked {
            if key.0 != request.entity() || seen.contains(key) {
                continue;
            }
            if let Some(current) = &tracked.current {
                if request.matches(current)? {
                    rows.push(current.clone());
                }
            }
        }

        request.sort_rows(&mut rows)?;
        if let Some(limit) = request.limit_value() {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    /// The row with `id` as this context sees it.
    pub fn get(&mut self, entity: Entity, id: Uuid) -> Result<Option<Row>> {
        let tracked = self.register(entity, id)?;
        Ok(tracked.current.clone())
    }

    /// Stage `row` as the new state of its id, inserting it if it does not
    /// exist yet. Rows whose required owner link is null are rejected.
    pub fn upsert(&mut self, row: Row) -> Result<()> {
        let entity = row.entity();
        for (name, value) in row.values() {
            let fits = entity
                .column(name)
                .map(|column| value_fits(column.kind, value))
                .unwrap_or(false);
            if !fits {
                return Err(VaultError::InvalidInput(format!(
                    "Value for {}.{} does not match the column type",
                    entity, name
                )));
            }
        }
        if let Some(owner) = entity.owner() {
            if owner.child_required && row.is_null(owner.foreign_key)? {
                return Err(VaultError::InvalidInput(format!(
                    "{}.{} must reference a {}",
                    entity, owner.foreign_key, owner.parent
                )));
            }
        }
        let tracked = self.register(entity, row.id())?;
        tracked.current = Some(row);
        Ok(())
    }

    /// Stage a hard delete of the row with `id` and, at commit, everything
    /// it owns. Deleting a row that does not exist is a no-op.
    pub fn delete(&mut self, entity: Entity, id: Uuid) -> Result<()> {
        let key = (entity, id);
        let tracked = self.register(entity, id)?;
        tracked.current = None;
        if tracked.original.is_none() {
            self.tracked.remove(&key);
        }
        Ok(())
    }

    pub fn has_changes(&self) -> bool {
        self.tracked.values().any(Tracked::is_modified)
    }

    /// Forget unmodified rows so the next fetch reads them afresh.
    pub fn refresh(&mut self) {
        self.tracked.retain(|_, tracked| tracked.is_modified());
    }

    /// Discard every staged change.
    pub fn rollback(&mut self) {
        self.tracked.clear();
    }

    /// Apply every staged change in one transaction.
    ///
    /// Inserts run owners first and overwrite a row another context created
    /// with the same id. Updates write only the columns this context
    /// changed; an update whose row has vanished re-inserts the full row.
    /// Deletes remove owned rows top-down by id. On error nothing is
    /// written and the staged changes are kept.
    pub fn commit(&mut self) -> Result<CommitSummary> {
        let started = Instant::now();
        let mut inserts: Vec<&Row> = Vec::new();
        let mut updates: Vec<(&Row, Vec<&'static str>)> = Vec::new();
        let mut deletes: Vec<(Entity, Uuid)> = Vec::new();

        for ((entity, id), tracked) in &self.tracked {
            match (&tracked.original, &tracked.current) {
                (None, Some(current)) => inserts.push(current),
                (Some(original), Some(current)) => {
                    let changed = current.changed_columns(original);
                    if !changed.is_empty() {
                        updates.push((current, changed));
                    }
                }
                (Some(_), None) => deletes.push((*entity, *id)),
                (None, None) => {}
            }
        }

        let mut summary = CommitSummary::default();
        if inserts.is_empty() && updates.is_empty() && deletes.is_empty() {
            self.tracked.clear();
            return Ok(summary);
        }

        inserts.sort_by_key(|row| (row.entity().depth(), row.id()));
        updates.sort_by_key(|(row, _)| (row.entity().depth(), row.id()));
        deletes.sort_by_key(|(entity, id)| (entity.depth(), *id));

        {
            let mut conn = lock_conn(&self.conn)?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            for row in &inserts {
                upsert_row(&tx, row)?;
                summary.inserted += 1;
            }

            for (row, changed) in &updates {
                if update_columns(&tx, row, changed)? {
                    summary.updated += 1;
                } else {
                    debug!(entity = %row.entity(), id = %row.id(), "Updated row vanished, re-inserting");
                    upsert_row(&tx, row)?;
                    summary.inserted += 1;
                }
            }

            for (entity, id) in &deletes {
                summary.deleted += delete_cascading(&tx, *entity, *id)?;
            }

            tx.commit()?;
        }

        self.tracked.clear();
        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Committed write context"
        );
        Ok(summary)
    }

    fn register(&mut self, entity: Entity, id: Uuid) -> Result<&mut Tracked> {
        let key = (entity, id);
        if !self.tracked.contains_key(&key) {
            let committed = {
                let conn = lock_conn(&self.conn)?;
                query_by_id(&conn, entity, id)?
            };
            self.tracked.insert(
                key,
                Tracked {
                    original: committed.clone(),
                    current: committed,
                },
            );
        }
        self.tracked
            .get_mut(&key)
            .ok_or_else(|| VaultError::Store("Tracked row disappeared".to_string()))
    }
}

fn upsert_row(conn: &Connection, row: &Row) -> Result<()> {
    let entity = row.entity();
    let mut names = vec![ID];
    let mut params = vec![uuid_value(row.id())];
    for (name, value) in row.values() {
        names.push(name);
        params.push(value.clone());
    }
    let placeholders = vec!["?"; names.len()].join(", ");
    let assignments: Vec<String> = names
        .iter()
        .filter(|name| **name != ID)
        .map(|name| format!("{} = excluded.{}", name, name))
        .collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
        entity.table(),
        names.join(", "),
        placeholders,
        ID,
        assignments.join(", ")
    );
    conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
    Ok(())
}

/// Returns false when no row with the id exists.
fn update_columns(conn: &Connection, row: &Row, changed: &[&'static str]) -> Result<bool> {
    let mut assignments = Vec::with_capacity(changed.len());
    let mut params: Vec<Value> = Vec::with_capacity(changed.len() + 1);
    for name in changed {
        assignments.push(format!("{} = ?", name));
        params.push(row.value(name)?);
    }
    params.push(uuid_value(row.id()));
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        row.entity().table(),
        assignments.join(", "),
        ID
    );
    let affected = conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
    Ok(affected > 0)
}

/// Delete a row and everything it owns. Owned ids are collected walking
/// down from the root; rows are then removed deepest first. Relationships
/// with a nullify rule unlink their children instead.
fn delete_cascading(conn: &Connection, entity: Entity, id: Uuid) -> Result<usize> {
    delete_following(conn, RELATIONSHIPS, entity, id)
}

fn delete_following(
    conn: &Connection,
    relationships: &[Relationship],
    entity: Entity,
    id: Uuid,
) -> Result<usize> {
    let mut levels: Vec<(Entity, Vec<Uuid>)> = vec![(entity, vec![id])];
    let mut frontier: Vec<(Entity, Vec<Uuid>)> = vec![(entity, vec![id])];

    while let Some((parent, ids)) = frontier.pop() {
        let owned = relationships
            .iter()
            .filter(|relationship| relationship.parent == parent);
        for relationship in owned {
            if relationship.delete_rule == DeleteRule::Nullify {
                let sql = format!(
                    "UPDATE {} SET {} = NULL WHERE {} = ?",
                    relationship.child.table(),
                    relationship.foreign_key,
                    relationship.foreign_key
                );
                let mut stmt = conn.prepare(&sql)?;
                for parent_id in &ids {
                    stmt.execute([uuid_value(*parent_id)])?;
                }
                continue;
            }

            let mut children = Vec::new();
            let sql = format!(
                "SELECT {} FROM {} WHERE {} = ?",
                ID,
                relationship.child.table(),
                relationship.foreign_key
            );
            let mut stmt = conn.prepare(&sql)?;
            for parent_id in &ids {
                let found = stmt.query_map([uuid_value(*parent_id)], |sql_row| {
                    sql_row.get::<_, String>(0)
                })?;
                for raw in found {
                    let raw = raw?;
                    let child_id = Uuid::parse_str(&raw).map_err(|e| {
                        VaultError::Store(format!("Invalid UUID in {}: {}", relationship.child, e))
                    })?;
                    children.push(child_id);
                }
            }
            if !children.is_empty() {
                levels.push((relationship.child, children.clone()));
                frontier.push((relationship.child, children));
            }
        }
    }

    levels.sort_by_key(|(entity, _)| std::cmp::Reverse(entity.depth()));
    let mut removed = 0;
    for (entity, ids) in levels {
        let sql = format!("DELETE FROM {} WHERE {} = ?", entity.table(), ID);
        let mut stmt = conn.prepare(&sql)?;
        for id in ids {
            removed += stmt.execute([uuid_value(id)])?;
        }
    }
    Ok(removed)
}
