//! Fetch requests: predicates, sort descriptors, and limits.

use std::cmp::Ordering;

use rusqlite::types::Value;
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::schema::{Entity, DELETED_AT, ID};

use super::row::{uuid_value, Row};

/// A condition on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(&'static str, Value),
    IsNull(&'static str),
    NotNull(&'static str),
    /// Column value is not one of the listed values. An empty list matches
    /// every row.
    NotIn(&'static str, Vec<Value>),
}

impl Predicate {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Predicate::Eq(column, value.into())
    }

    pub fn eq_uuid(column: &'static str, id: Uuid) -> Self {
        Predicate::Eq(column, uuid_value(id))
    }

    pub fn not_in_uuids(column: &'static str, ids: impl IntoIterator<Item = Uuid>) -> Self {
        Predicate::NotIn(column, ids.into_iter().map(uuid_value).collect())
    }

    /// Rows that are not soft-deleted.
    pub fn live() -> Self {
        Predicate::IsNull(DELETED_AT)
    }

    pub fn column(&self) -> &'static str {
        match self {
            Predicate::Eq(column, _)
            | Predicate::IsNull(column)
            | Predicate::NotNull(column)
            | Predicate::NotIn(column, _) => column,
        }
    }

    pub fn matches(&self, row: &Row) -> Result<bool> {
        let value = row.value(self.column())?;
        Ok(match self {
            // SQL equality never matches NULL.
            Predicate::Eq(_, expected) => value != Value::Null && &value == expected,
            Predicate::IsNull(_) => value == Value::Null,
            Predicate::NotNull(_) => value != Value::Null,
            Predicate::NotIn(_, excluded) => {
                excluded.is_empty() || (value != Value::Null && !excluded.contains(&value))
            }
        })
    }

    fn push_sql(&self, conditions: &mut Vec<String>, params: &mut Vec<Value>) {
        match self {
            Predicate::Eq(column, value) => {
                conditions.push(format!("{} = ?", column));
                params.push(value.clone());
            }
            Predicate::IsNull(column) => conditions.push(format!("{} IS NULL", column)),
            Predicate::NotNull(column) => conditions.push(format!("{} IS NOT NULL", column)),
            Predicate::NotIn(_, excluded) if excluded.is_empty() => {}
            Predicate::NotIn(column, excluded) => {
                let placeholders = vec!["?"; excluded.len()].join(", ");
                conditions.push(format!("{} NOT IN ({})", column, placeholders));
                params.extend(excluded.iter().cloned());
            }
        }
    }
}

/// Sort direction for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortDescriptor {
    pub column: &'static str,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn ascending(column: &'static str) -> Self {
        Self {
            column,
            ascending: true,
        }
    }

    pub fn descending(column: &'static str) -> Self {
        Self {
            column,
            ascending: false,
        }
    }
}

/// What to fetch from one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    entity: Entity,
    predicates: Vec<Predicate>,
    sort: Vec<SortDescriptor>,
    limit: Option<usize>,
}

impl FetchRequest {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            predicates: Vec::new(),
            sort: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn sort_by(mut self, descriptor: SortDescriptor) -> Self {
        self.sort.push(descriptor);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Reject columns the entity does not have before any SQL is built.
    pub fn validate(&self) -> Result<()> {
        let columns = self
            .predicates
            .iter()
            .map(Predicate::column)
            .chain(self.sort.iter().map(|descriptor| descriptor.column));
        for column in columns {
            if self.entity.column(column).is_none() {
                return Err(VaultError::InvalidInput(format!(
                    "Column {} does not exist on {}",
                    column, self.entity
                )));
            }
        }
        Ok(())
    }

    pub fn matches(&self, row: &Row) -> Result<bool> {
        if row.entity() != self.entity {
            return Ok(false);
        }
        for predicate in &self.predicates {
            if !predicate.matches(row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Order `rows` the same way the SQL `ORDER BY` would.
    pub fn sort_rows(&self, rows: &mut [Row]) -> Result<()> {
        if self.sort.is_empty() {
            return Ok(());
        }
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let key = self
                .sort
                .iter()
                .map(|descriptor| row.value(descriptor.column))
                .collect::<Result<Vec<Value>>>()?;
            keyed.push(key);
        }
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|a, b| {
            for (index, descriptor) in self.sort.iter().enumerate() {
                let ordering = compare_values(&keyed[*a][index], &keyed[*b][index]);
                let ordering = if descriptor.ascending {
                    ordering
                } else {
                    ordering.reverse()
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        let sorted: Vec<Row> = order.into_iter().map(|index| rows[index].clone()).collect();
        rows.clone_from_slice(&sorted);
        Ok(())
    }

    /// Build the SELECT for this request.
    ///
    /// `with_limit` is false when the caller filters further in memory and
    /// applies the limit itself.
    pub(crate) fn to_sql(&self, with_limit: bool) -> (String, Vec<Value>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        for predicate in &self.predicates {
            predicate.push_sql(&mut conditions, &mut params);
        }

        let mut query = format!(
            "SELECT {} FROM {}",
            select_columns(self.entity),
            self.entity.table()
        );
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        if !self.sort.is_empty() {
            let order: Vec<String> = self
                .sort
                .iter()
                .map(|descriptor| {
                    format!(
                        "{} {}",
                        descriptor.column,
                        if descriptor.ascending { "ASC" } else { "DESC" }
                    )
                })
                .collect();
            query.push_str(" ORDER BY ");
            query.push_str(&order.join(", "));
        }
        if let (true, Some(limit)) = (with_limit, self.limit) {
            query.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }
        (query, params)
    }
}

/// `id` first, then the remaining columns in schema order.
pub(crate) fn select_columns(entity: Entity) -> String {
    let mut names = vec![ID];
    names.extend(
        entity
            .columns()
            .iter()
            .map(|column| column.name)
            .filter(|name| *name != ID),
    );
    names.join(", ")
}

/// SQLite's cross-type ordering: NULL, numbers, text, blobs.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Integer(_) | Value::Real(_) => 1,
            Value::Text(_) => 2,
            Value::Blob(_) => 3,
        }
    }
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Real(x), Value::Real(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Integer(x), Value::Real(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Real(x), Value::Integer(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Blob(x), Value::Blob(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
