use crate::builder::Statement;
use crate::config::{Config, ConnectParams};
use crate::error::{DbError, Result};
use crate::table::{Table, Value};
use rusqlite::limits::Limit;
use rusqlite::{Connection, OptionalExtension, Transaction, params_from_iter};
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod schema;

/// A live database session.
///
/// One handle is one connection; it is not shared across threads. Every
/// operation in the crate takes it explicitly.
pub struct Db {
    conn: Connection,
    params: ConnectParams,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").field("params", &self.params).finish()
    }
}

impl Db {
    pub fn connect(params: &ConnectParams) -> Result<Self> {
        if params.dbname.trim().is_empty() {
            return Err(DbError::Connection("no database name supplied".to_string()));
        }
        if params.host.is_some() || params.port.is_some() {
            debug!(
                host = params.host.as_deref().unwrap_or(""),
                port = params.port.unwrap_or(0),
                "network parameters are not used by the embedded store"
            );
        }

        info!(dbname = %params.dbname, "connecting to db");
        let conn = if params.is_in_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(&params.dbname)
        }
        .map_err(|err| {
            warn!(dbname = %params.dbname, "failed to connect to db: {err}");
            DbError::Connection(format!("open {}: {err}", params.dbname))
        })?;

        let config = Config::get();
        conn.busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .map_err(|err| DbError::Connection(err.to_string()))?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            ",
        )
        .map_err(|err| DbError::Connection(err.to_string()))?;
        info!(dbname = %params.dbname, "connected");

        Ok(Self {
            conn,
            params: params.clone(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::connect(&ConnectParams::in_memory())
    }

    pub fn params(&self) -> &ConnectParams {
        &self.params
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run a statement and materialize its result set.
    ///
    /// A statement without result columns runs to completion and yields an
    /// empty table.
    pub fn query(&self, statement: &Statement) -> Result<Table> {
        debug!(sql = %statement.sql, params = statement.params.len(), "query");
        let mut stmt = self.conn.prepare(&statement.sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        if columns.is_empty() {
            stmt.execute(params_from_iter(statement.params.iter()))?;
            return Ok(Table::default());
        }

        let mut table = Table::new(columns);
        let width = table.columns.len();
        let mut rows = stmt.query(params_from_iter(statement.params.iter()))?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                cells.push(Value::from(row.get_ref(idx)?));
            }
            table.push(cells);
        }
        Ok(table)
    }

    /// Read path that never fails outward: errors are logged and degrade to an
    /// empty table whose `failure()` holds the cause.
    pub fn execute(&self, statement: &Statement) -> Table {
        match self.query(statement) {
            Ok(table) => table,
            Err(err) => {
                warn!(sql = %statement.sql, "query failed: {err}");
                Table::failed(err)
            }
        }
    }

    pub fn execute_sql(&self, sql: &str) -> Table {
        self.execute(&Statement::new(sql))
    }

    /// Run one write statement as its own unit of work: commit on success,
    /// roll back on failure.
    pub fn write(&self, statement: &Statement) -> Result<usize> {
        let unit = self.begin()?;
        match unit.execute(statement) {
            Ok(changed) => {
                unit.commit()?;
                Ok(changed)
            }
            Err(err) => {
                warn!(sql = %statement.sql, "statement failed, rolling back: {err}");
                unit.rollback()?;
                Err(err)
            }
        }
    }

    /// Open an explicit unit of work. Dropping it without commit rolls back.
    pub fn begin(&self) -> Result<UnitOfWork<'_>> {
        Ok(UnitOfWork {
            tx: self.conn.unchecked_transaction()?,
        })
    }

    pub fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Most `?` parameters one statement may bind on this connection.
    pub fn max_bound_params(&self) -> usize {
        self.conn.limit(Limit::SQLITE_LIMIT_VARIABLE_NUMBER).max(1) as usize
    }

    /// Largest `id` in the table, `None` when it is empty.
    pub fn max_id(&self, table: &str) -> Result<Option<i64>> {
        let sql = format!("SELECT max(\"id\") FROM {}", crate::builder::quote_ident(table)?);
        let value: Option<Option<i64>> = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .optional()?;
        Ok(value.flatten())
    }
}

/// A transaction over the handle's connection.
pub struct UnitOfWork<'a> {
    tx: Transaction<'a>,
}

impl UnitOfWork<'_> {
    pub fn execute(&self, statement: &Statement) -> Result<usize> {
        debug!(sql = %statement.sql, params = statement.params.len(), "execute");
        self.tx
            .execute(&statement.sql, params_from_iter(statement.params.iter()))
            .map_err(DbError::from)
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit().map_err(DbError::from)
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback().map_err(DbError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Db {
        let db = Db::open_in_memory().unwrap();
        db.conn()
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT UNIQUE, score REAL);")
            .unwrap();
        db
    }

    #[test]
    fn query_materializes_named_columns() {
        let db = db();
        db.write(&Statement::with_params(
            "INSERT INTO t (name, score) VALUES (?, ?)",
            vec![Value::from("a"), Value::Real(1.5)],
        ))
        .unwrap();
        let table = db.query(&Statement::new("SELECT id, name, score FROM t")).unwrap();
        assert_eq!(table.columns, vec!["id", "name", "score"]);
        assert_eq!(table.get(0, "score"), Some(&Value::Real(1.5)));
    }

    #[test]
    fn empty_result_is_not_a_failure() {
        let db = db();
        let table = db.execute_sql("SELECT * FROM t");
        assert!(table.is_empty());
        assert!(table.failure().is_none());
        assert_eq!(table.columns.len(), 3);
    }

    #[test]
    fn malformed_sql_degrades_to_inspectable_empty_table() {
        let db = db();
        let table = db.execute_sql("SELEC nonsense");
        assert!(table.is_empty());
        assert!(matches!(table.failure(), Some(DbError::Execution(_))));
    }

    #[test]
    fn statement_without_columns_yields_empty_table() {
        let db = db();
        let table = db.execute_sql("INSERT INTO t (name) VALUES ('z')");
        assert!(table.failure().is_none());
        assert_eq!(db.max_id("t").unwrap(), Some(1));
    }

    #[test]
    fn failed_write_rolls_back_and_reports_conflict() {
        let db = db();
        let insert = Statement::with_params("INSERT INTO t (name) VALUES (?)", vec![Value::from("dup")]);
        db.write(&insert).unwrap();
        let err = db.write(&insert).unwrap_err();
        assert!(err.is_conflict());
        // The handle is usable again after the rollback.
        db.write(&Statement::with_params(
            "INSERT INTO t (name) VALUES (?)",
            vec![Value::from("other")],
        ))
        .unwrap();
        assert_eq!(db.query(&Statement::new("SELECT * FROM t")).unwrap().len(), 2);
    }

    #[test]
    fn empty_dbname_is_a_connection_error() {
        let err = Db::connect(&ConnectParams::default()).unwrap_err();
        assert!(matches!(err, DbError::Connection(_)));
    }

    #[test]
    fn max_id_of_empty_table_is_none() {
        let db = db();
        assert_eq!(db.max_id("t").unwrap(), None);
    }
}
