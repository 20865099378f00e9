use crate::error::DbError;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell value as stored in SQLite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Integer(_) => ValueKind::Integer,
            Value::Real(_) => ValueKind::Real,
            Value::Text(_) => ValueKind::Text,
            Value::Blob(_) => ValueKind::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers widen to floats; SQLite returns whole REAL values as integers after aggregates.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// SQL literal form, used only for dry-run rendering.
    pub fn to_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    format!("{v:.1}")
                } else {
                    v.to_string()
                }
            }
            Value::Text(v) => format!("'{}'", v.replace('\'', "''")),
            Value::Blob(bytes) => {
                let mut out = String::with_capacity(bytes.len() * 2 + 3);
                out.push_str("X'");
                for byte in bytes {
                    out.push_str(&format!("{byte:02X}"));
                }
                out.push('\'');
                out
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(v) => f.write_str(v),
            other => f.write_str(&other.to_literal()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            Value::Null => ValueRef::Null,
            Value::Integer(v) => ValueRef::Integer(*v),
            Value::Real(v) => ValueRef::Real(*v),
            Value::Text(v) => ValueRef::Text(v.as_bytes()),
            Value::Blob(v) => ValueRef::Blob(v),
        }))
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => Value::Blob(v.to_vec()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

pub type Row = Vec<Value>;

/// In-memory result set: named, ordered columns and rows of cells.
///
/// An empty table is a valid outcome. A table produced by the degrading
/// executor after a failed statement is also empty, but carries the failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(skip)]
    failure: Option<DbError>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            failure: None,
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            failure: None,
        }
    }

    pub(crate) fn failed(failure: DbError) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            failure: Some(failure),
        }
    }

    pub fn push(&mut self, row: Row) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The error behind an empty result, if the statement failed.
    pub fn failure(&self) -> Option<&DbError> {
        self.failure.as_ref()
    }

    pub fn into_result(self) -> Result<Table, DbError> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Kind of the first non-null cell in the column.
    pub fn column_kind(&self, name: &str) -> Option<ValueKind> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .map(|row| row[idx].kind())
            .find(|kind| *kind != ValueKind::Null)
    }

    /// Rows as column-name keyed maps, the shape the CLI prints.
    pub fn records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(col, value)| {
                        let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                        (col.clone(), json)
                    })
                    .collect()
            })
            .collect()
    }

    /// Build a table from JSON records; columns are the first record's keys
    /// and every other record must carry exactly the same keys.
    pub fn from_records(records: &[serde_json::Map<String, serde_json::Value>]) -> Result<Self, DbError> {
        let Some(first) = records.first() else {
            return Ok(Table::default());
        };
        let columns: Vec<String> = first.keys().cloned().collect();
        let mut table = Table::new(columns);
        for (idx, record) in records.iter().enumerate() {
            if let Some(key) = record.keys().find(|key| !table.columns.contains(*key)) {
                return Err(DbError::Validation(format!(
                    "record {idx} has unexpected column <{key}>"
                )));
            }
            if let Some(col) = table.columns.iter().find(|col| !record.contains_key(*col)) {
                return Err(DbError::Validation(format!(
                    "record {idx} is missing column <{col}>"
                )));
            }
            let mut row = Vec::with_capacity(table.columns.len());
            for col in &table.columns {
                let raw = record.get(col).cloned().unwrap_or(serde_json::Value::Null);
                let value: Value = serde_json::from_value(raw).map_err(|err| {
                    DbError::Validation(format!("record {idx} column {col}: {err}"))
                })?;
                row.push(value);
            }
            table.push(row);
        }
        Ok(table)
    }

    /// Remove the named columns; the rest keep their order.
    pub fn drop_columns(mut self, drop: &[String]) -> Self {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|idx| !drop.contains(&self.columns[*idx]))
            .collect();
        self.columns = keep.iter().map(|idx| self.columns[*idx].clone()).collect();
        for row in &mut self.rows {
            let old = std::mem::take(row);
            *row = old
                .into_iter()
                .enumerate()
                .filter(|(idx, _)| keep.contains(idx))
                .map(|(_, value)| value)
                .collect();
        }
        self
    }

    /// Append the rows of `other`, matching columns by name. Missing cells become NULL.
    pub fn concat(mut self, other: Table) -> Table {
        if self.columns.is_empty() {
            return other;
        }
        for col in &other.columns {
            if self.column_index(col).is_none() {
                self.columns.push(col.clone());
                for row in &mut self.rows {
                    row.push(Value::Null);
                }
            }
        }
        for row in other.rows {
            let mut merged = vec![Value::Null; self.columns.len()];
            for (col, value) in other.columns.iter().zip(row) {
                if let Some(idx) = self.column_index(col) {
                    merged[idx] = value;
                }
            }
            self.rows.push(merged);
        }
        self
    }
}
