//! Generic, schema-checked rows.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::schema::{ColumnKind, Entity, ID};

/// Encode a UUID the way the store persists it.
pub fn uuid_value(id: Uuid) -> Value {
    Value::Text(id.to_string())
}

/// Encode a timestamp the way the store persists it.
///
/// Fixed-width RFC 3339 in UTC, so text order matches time order.
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::Text(at.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| VaultError::Store(format!("Invalid UUID: {}", e)))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| VaultError::Store(format!("Invalid timestamp: {}", e)))?
        .with_timezone(&Utc))
}

/// One row of an entity table: its id plus every other column.
///
/// Unset columns hold `Value::Null`. Column names are checked against the
/// schema on write, so a row never carries a column its table lacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    entity: Entity,
    id: Uuid,
    values: BTreeMap<&'static str, Value>,
}

impl Row {
    /// A row with every non-id column null.
    pub fn new(entity: Entity, id: Uuid) -> Self {
        let values = entity
            .columns()
            .iter()
            .filter(|column| column.name != ID)
            .map(|column| (column.name, Value::Null))
            .collect();
        Self { entity, id, values }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Column/value pairs excluding the id, in column-name order.
    pub fn values(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(name, value)| (*name, value))
    }

    /// Raw value of a column. The id column is returned in its stored form.
    pub fn value(&self, column: &str) -> Result<Value> {
        if column == ID {
            return Ok(uuid_value(self.id));
        }
        self.values
            .get(column)
            .cloned()
            .ok_or_else(|| self.unknown_column(column))
    }

    pub fn set(&mut self, column: &str, value: Value) -> Result<()> {
        let column_def = self
            .entity
            .column(column)
            .filter(|column_def| column_def.name != ID)
            .ok_or_else(|| self.unknown_column(column))?;
        self.values.insert(column_def.name, value);
        Ok(())
    }

    pub fn set_text(&mut self, column: &str, value: Option<&str>) -> Result<()> {
        self.set(column, value.map_or(Value::Null, |v| Value::Text(v.to_string())))
    }

    pub fn set_uuid(&mut self, column: &str, value: Option<Uuid>) -> Result<()> {
        self.set(column, value.map_or(Value::Null, uuid_value))
    }

    pub fn set_timestamp(&mut self, column: &str, value: Option<DateTime<Utc>>) -> Result<()> {
        self.set(column, value.map_or(Value::Null, timestamp_value))
    }

    pub fn set_integer(&mut self, column: &str, value: i64) -> Result<()> {
        self.set(column, Value::Integer(value))
    }

    pub fn set_blob(&mut self, column: &str, value: Vec<u8>) -> Result<()> {
        self.set(column, Value::Blob(value))
    }

    pub fn is_null(&self, column: &str) -> Result<bool> {
        Ok(matches!(self.value(column)?, Value::Null))
    }

    pub fn text(&self, column: &str) -> Result<Option<String>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Text(value) => Ok(Some(value)),
            other => Err(self.type_mismatch(column, "text", &other)),
        }
    }

    pub fn uuid(&self, column: &str) -> Result<Option<Uuid>> {
        self.text(column)?.as_deref().map(parse_uuid).transpose()
    }

    pub fn timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>> {
        self.text(column)?.as_deref().map(parse_timestamp).transpose()
    }

    pub fn integer(&self, column: &str) -> Result<Option<i64>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Integer(value) => Ok(Some(value)),
            other => Err(self.type_mismatch(column, "integer", &other)),
        }
    }

    pub fn blob(&self, column: &str) -> Result<Option<Vec<u8>>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Blob(value) => Ok(Some(value)),
            other => Err(self.type_mismatch(column, "blob", &other)),
        }
    }

    /// Columns whose value differs from `original`.
    pub fn changed_columns(&self, original: &Row) -> Vec<&'static str> {
        self.values
            .iter()
            .filter(|(name, value)| original.values.get(*name) != Some(*value))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Read a row selected with [`select_columns`](super::query::select_columns).
    pub(crate) fn from_sql(entity: Entity, sql_row: &rusqlite::Row<'_>) -> Result<Self> {
        let raw_id: String = sql_row.get(0)?;
        let id = parse_uuid(&raw_id)?;
        let mut row = Row::new(entity, id);
        for (index, column) in entity
            .columns()
            .iter()
            .filter(|column| column.name != ID)
            .enumerate()
        {
            let value: Value = sql_row.get(index + 1)?;
            row.values.insert(column.name, value);
        }
        Ok(row)
    }

    fn unknown_column(&self, column: &str) -> VaultError {
        VaultError::InvalidInput(format!(
            "Column {} does not exist on {}",
            column, self.entity
        ))
    }

    fn type_mismatch(&self, column: &str, expected: &str, found: &Value) -> VaultError {
        VaultError::Encoding(format!(
            "{}.{} holds {:?}, expected {}",
            self.entity,
            column,
            found.data_type(),
            expected
        ))
    }
}

/// Whether `value` is a plausible encoding for a column of `kind`.
pub(crate) fn value_fits(kind: ColumnKind, value: &Value) -> bool {
    match (kind, value) {
        (_, Value::Null) => true,
        (ColumnKind::Uuid, Value::Text(text)) => Uuid::parse_str(text).is_ok(),
        (ColumnKind::Timestamp, Value::Text(text)) => DateTime::parse_from_rfc3339(text).is_ok(),
        (ColumnKind::Text, Value::Text(_)) => true,
        (ColumnKind::Integer, Value::Integer(_)) => true,
        (ColumnKind::Blob, Value::Blob(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{block, prompt};

    #[test]
    fn test_new_row_has_every_column_null() {
        let row = Row::new(Entity::Block, Uuid::new_v4());
        assert_eq!(row.values().count(), Entity::Block.columns().len() - 1);
        assert!(row.is_null(block::ENCRYPTED_CONTENT).unwrap());
    }

    #[test]
    fn test_unknown_column_rejected() {
        let mut row = Row::new(Entity::Prompt, Uuid::new_v4());
        assert!(matches!(
            row.set_text("body", Some("x")),
            Err(VaultError::InvalidInput(_))
        ));
        assert!(row.set_text(ID, Some("x")).is_err());
    }

    #[test]
    fn test_typed_round_trip() {
        let now = Utc::now();
        let project = Uuid::new_v4();
        let mut row = Row::new(Entity::Prompt, Uuid::new_v4());
        row.set_text(prompt::TITLE, Some("Hello")).unwrap();
        row.set_uuid(prompt::PROJECT_ID, Some(project)).unwrap();
        row.set_timestamp(prompt::UPDATED_AT, Some(now)).unwrap();

        assert_eq!(row.text(prompt::TITLE).unwrap().as_deref(), Some("Hello"));
        assert_eq!(row.uuid(prompt::PROJECT_ID).unwrap(), Some(project));
        assert_eq!(row.timestamp(prompt::UPDATED_AT).unwrap(), Some(now));
        assert_eq!(row.uuid(ID).unwrap(), Some(row.id()));
    }

    #[test]
    fn test_type_mismatch_is_encoding_error() {
        let mut row = Row::new(Entity::Block, Uuid::new_v4());
        row.set(block::ENCRYPTED_CONTENT, Value::Text("plain".into()))
            .unwrap();
        assert!(matches!(
            row.blob(block::ENCRYPTED_CONTENT),
            Err(VaultError::Encoding(_))
        ));
    }

    #[test]
    fn test_changed_columns() {
        let id = Uuid::new_v4();
        let mut original = Row::new(Entity::Prompt, id);
        original.set_text(prompt::TITLE, Some("A")).unwrap();
        let mut edited = original.clone();
        assert!(edited.changed_columns(&original).is_empty());

        edited.set_text(prompt::TITLE, Some("B")).unwrap();
        assert_eq!(edited.changed_columns(&original), vec![prompt::TITLE]);
    }

    #[test]
    fn test_timestamps_sort_as_text() {
        let earlier = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = earlier + chrono::Duration::milliseconds(1);
        match (timestamp_value(earlier), timestamp_value(later)) {
            (Value::Text(a), Value::Text(b)) => assert!(a < b),
            _ => panic!("timestamps encode as text"),
        }
    }

    #[test]
    fn test_value_fits() {
        assert!(value_fits(ColumnKind::Uuid, &uuid_value(Uuid::new_v4())));
        assert!(!value_fits(ColumnKind::Uuid, &Value::Text("nope".into())));
        assert!(value_fits(ColumnKind::Blob, &Value::Null));
        assert!(!value_fits(ColumnKind::Integer, &Value::Text("1".into())));
    }
}
