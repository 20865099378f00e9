use crate::error::{DbError, Result};
use crate::table::{Table, Value};
use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AssetType {
    pub id: i64,
    #[serde(rename = "type")]
    pub type_name: String,
    pub subtype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Asset {
    pub id: i64,
    pub type_id: i64,
    pub owner: Option<String>,
    pub process_id: Option<i64>,
    pub group_id: i64,
    pub serial_number: Option<String>,
    pub common_name: Option<String>,
    pub age: Option<f64>,
    pub eol: Option<f64>,
    pub rul: Option<f64>,
    pub units: Option<String>,
}

/// Row of a per-type component table. Columns beyond the common four are
/// kept as-is in `extra`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Component {
    pub table: String,
    pub id: i64,
    pub unit: i64,
    pub num_samples: Option<i64>,
    pub misc_info: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, Value)>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Group {
    pub id: i64,
    pub group: String,
    pub current: Option<f64>,
    pub num_devices: Option<i64>,
    pub info: Option<String>,
}

static NULL: Value = Value::Null;

/// Typed access to one row of a result table.
struct RowView<'a> {
    table: &'a Table,
    row: usize,
}

impl<'a> RowView<'a> {
    fn value(&self, column: &str) -> &'a Value {
        self.table.get(self.row, column).unwrap_or(&NULL)
    }

    fn i64(&self, column: &str) -> Result<i64> {
        self.value(column).as_i64().ok_or_else(|| {
            DbError::Execution(format!("column <{column}> is missing or not an integer"))
        })
    }

    fn opt_i64(&self, column: &str) -> Option<i64> {
        self.value(column).as_i64()
    }

    fn opt_f64(&self, column: &str) -> Option<f64> {
        self.value(column).as_f64()
    }

    fn text(&self, column: &str) -> Result<String> {
        self.opt_text(column)
            .ok_or_else(|| DbError::Execution(format!("column <{column}> is missing or not text")))
    }

    fn opt_text(&self, column: &str) -> Option<String> {
        self.value(column).as_str().map(str::to_string)
    }
}

fn rows(table: &Table) -> impl Iterator<Item = RowView<'_>> {
    (0..table.len()).map(move |row| RowView { table, row })
}

impl AssetType {
    pub fn from_table(table: &Table) -> Result<Vec<Self>> {
        rows(table)
            .map(|row| {
                Ok(AssetType {
                    id: row.i64("id")?,
                    type_name: row.text("type")?,
                    subtype: row.text("subtype")?,
                    description: row.opt_text("description"),
                })
            })
            .collect()
    }
}

impl Asset {
    pub fn from_table(table: &Table) -> Result<Vec<Self>> {
        rows(table)
            .map(|row| {
                Ok(Asset {
                    id: row.i64("id")?,
                    type_id: row.i64("type_id")?,
                    owner: row.opt_text("owner"),
                    process_id: row.opt_i64("process_id"),
                    group_id: row.i64("group_id")?,
                    serial_number: row.opt_text("serial_number"),
                    common_name: row.opt_text("common_name"),
                    age: row.opt_f64("age"),
                    eol: row.opt_f64("eol"),
                    rul: row.opt_f64("rul"),
                    units: row.opt_text("units"),
                })
            })
            .collect()
    }
}

impl Component {
    pub fn from_table(table_name: &str, table: &Table) -> Result<Vec<Self>> {
        const COMMON: [&str; 4] = ["id", "unit", "num_samples", "misc_info"];
        rows(table)
            .map(|row| {
                let extra = table
                    .columns
                    .iter()
                    .filter(|col| !COMMON.contains(&col.as_str()))
                    .map(|col| (col.clone(), row.value(col).clone()))
                    .collect();
                Ok(Component {
                    table: table_name.to_string(),
                    id: row.i64("id")?,
                    unit: row.i64("unit")?,
                    num_samples: row.opt_i64("num_samples"),
                    misc_info: row.opt_text("misc_info"),
                    extra,
                })
            })
            .collect()
    }
}

impl Group {
    pub fn from_table(table: &Table) -> Result<Vec<Self>> {
        rows(table)
            .map(|row| {
                Ok(Group {
                    id: row.i64("id")?,
                    group: row.text("group")?,
                    current: row.opt_f64("current"),
                    num_devices: row.opt_i64("num_devices"),
                    info: row.opt_text("info"),
                })
            })
            .collect()
    }
}
