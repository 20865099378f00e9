//! Catalog lookups: which tables exist and which columns they carry.

use crate::builder::Statement;
use crate::db::Db;
use crate::error::{DbError, Result};
use crate::table::{Table, Value};

const TABLES_SQL: &str = "SELECT name AS table_name FROM sqlite_master
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
     ORDER BY name";

pub fn list_tables(db: &Db) -> Result<Vec<String>> {
    let table = db.query(&Statement::new(TABLES_SQL))?;
    Ok(string_column(&table))
}

pub fn table_exists(db: &Db, name: &str) -> Result<bool> {
    let table = db.query(&Statement::with_params(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
        vec![Value::from(name)],
    ))?;
    Ok(!table.is_empty())
}

/// Column metadata of `table` (name, declared type, nullability, default, key position).
pub fn column_table(db: &Db, table: &str) -> Result<Table> {
    if !table_exists(db, table)? {
        return Err(DbError::Precondition(format!("table <{table}> does not exist")));
    }
    db.query(&Statement::with_params(
        "SELECT name AS column_name, type AS data_type, \"notnull\" AS not_null,
                dflt_value AS column_default, pk AS primary_key
         FROM pragma_table_info(?)
         ORDER BY cid",
        vec![Value::from(table)],
    ))
}

pub fn list_columns(db: &Db, table: &str) -> Result<Vec<String>> {
    Ok(string_column(&column_table(db, table)?))
}

/// Fail unless `table` exists and carries every one of `columns`.
pub fn require_columns<S: AsRef<str>>(db: &Db, table: &str, columns: &[S]) -> Result<()> {
    let available = list_columns(db, table)?;
    let missing: Vec<&str> = columns
        .iter()
        .map(AsRef::as_ref)
        .filter(|col| !available.iter().any(|have| have == col))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DbError::Precondition(format!(
            "table <{table}> does not contain columns <{}>",
            missing.join(", ")
        )))
    }
}

fn string_column(table: &Table) -> Vec<String> {
    table
        .rows
        .iter()
        .filter_map(|row| row.first().and_then(Value::as_str).map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    fn db() -> Db {
        let db = Db::open_in_memory().unwrap();
        schema::bootstrap(db.conn()).unwrap();
        db
    }

    #[test]
    fn lists_reference_tables() {
        let db = db();
        let tables = list_tables(&db).unwrap();
        assert!(tables.contains(&"asset_tb".to_string()));
        assert!(tables.contains(&"engine_ncmapss_tb".to_string()));
        assert!(table_exists(&db, "group_tb").unwrap());
        assert!(!table_exists(&db, "missing_tb").unwrap());
    }

    #[test]
    fn columns_follow_declaration_order() {
        let db = db();
        let columns = list_columns(&db, "asset_type_tb").unwrap();
        assert_eq!(columns, vec!["id", "type", "subtype", "description"]);
        let meta = column_table(&db, "asset_type_tb").unwrap();
        assert_eq!(meta.get(1, "data_type"), Some(&Value::from("TEXT")));
    }

    #[test]
    fn missing_table_is_a_precondition_error() {
        let db = db();
        assert!(matches!(
            list_columns(&db, "nope"),
            Err(DbError::Precondition(_))
        ));
    }

    #[test]
    fn require_columns_names_the_missing_ones() {
        let db = db();
        require_columns(&db, "group_tb", &["group", "current"]).unwrap();
        let err = require_columns(&db, "group_tb", &["group", "voltage"]).unwrap_err();
        assert_eq!(
            err,
            DbError::Precondition("table <group_tb> does not contain columns <voltage>".into())
        );
    }
}
