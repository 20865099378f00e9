//! Chunked multi-row inserts.
//!
//! Grouped statements are far faster than row-by-row inserts; chunking keeps
//! each statement and its bound parameters bounded.

use crate::builder::{multi_row_insert, quote_ident};
use crate::catalog;
use crate::db::Db;
use crate::error::{DbError, Result};
use crate::table::{Row, Table};
use crate::util::{Progress, chunks};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of one chunk that failed and was rolled back.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkFailure {
    pub offset: usize,
    pub rows: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Largest id in the target table after the load. Not necessarily a row
    /// this load inserted when a chunk failed.
    pub last_id: Option<i64>,
    pub chunks: usize,
    pub committed: usize,
    pub rows_inserted: usize,
    pub failures: Vec<ChunkFailure>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Insert every row of `rows` into `table` in at most `target_batches` chunks.
///
/// Each chunk commits or rolls back on its own; a failed chunk is logged and
/// skipped, never retried.
pub fn batch_insert(
    db: &Db,
    table: &str,
    rows: &Table,
    target_batches: usize,
    progress: &mut dyn Progress,
) -> Result<BatchReport> {
    quote_ident(table)?;
    if target_batches == 0 {
        return Err(DbError::Precondition(
            "target batch count must be at least 1".to_string(),
        ));
    }
    if !catalog::table_exists(db, table)? {
        return Err(DbError::Precondition(format!("table <{table}> does not exist")));
    }
    catalog::require_columns(db, table, rows.columns.as_slice())?;

    let parts: Vec<_> = chunks(&rows.rows, target_batches).collect();
    let total = parts.len();
    debug!(
        table,
        rows = rows.len(),
        chunks = total,
        "batch insert"
    );

    let mut report = BatchReport {
        last_id: None,
        chunks: total,
        committed: 0,
        rows_inserted: 0,
        failures: Vec::new(),
    };
    for (done, (offset, slice)) in parts.into_iter().enumerate() {
        match insert_chunk(db, table, &rows.columns, slice) {
            Ok(()) => {
                report.committed += 1;
                report.rows_inserted += slice.len();
            }
            Err(err) => {
                warn!(table, offset, rows = slice.len(), "chunk rolled back: {err}");
                report.failures.push(ChunkFailure {
                    offset,
                    rows: slice.len(),
                    error: err.to_string(),
                });
            }
        }
        progress.advance(done + 1, total);
    }
    progress.finish();

    report.last_id = db.max_id(table)?;
    info!(
        table,
        committed = report.committed,
        failed = report.failed(),
        rows = report.rows_inserted,
        "batch insert finished"
    );
    Ok(report)
}

/// Rows one INSERT may carry without exceeding the connection's bound
/// parameter limit.
fn rows_per_statement(db: &Db, columns: usize) -> Result<usize> {
    let limit = db.max_bound_params();
    if columns > limit {
        return Err(DbError::Precondition(format!(
            "{columns} columns exceed the limit of {limit} bound parameters per statement"
        )));
    }
    Ok(limit / columns.max(1))
}

/// One unit of work per chunk; a chunk larger than one statement allows is
/// written as several statements inside that unit.
fn insert_chunk(db: &Db, table: &str, columns: &[String], rows: &[Row]) -> Result<()> {
    let per_statement = rows_per_statement(db, columns.len())?;
    let unit = db.begin()?;
    for part in rows.chunks(per_statement) {
        let written =
            multi_row_insert(table, columns, part).and_then(|statement| unit.execute(&statement));
        if let Err(err) = written {
            unit.rollback()?;
            return Err(err);
        }
    }
    unit.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;
    use crate::util::NoProgress;
    use rusqlite::limits::Limit;

    fn db() -> Db {
        let db = Db::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "CREATE TABLE readings (
                    id INTEGER PRIMARY KEY,
                    asset_id INTEGER NOT NULL,
                    cycle INTEGER NOT NULL,
                    voltage REAL
                );",
            )
            .unwrap();
        db
    }

    fn readings(count: i64) -> Table {
        Table::with_rows(
            vec!["asset_id".into(), "cycle".into(), "voltage".into()],
            (0..count)
                .map(|i| vec![Value::Integer(1), Value::Integer(i), Value::Real(i as f64 * 0.5)])
                .collect(),
        )
    }

    #[test]
    fn ninety_five_rows_land_in_ten_chunks() {
        let db = db();
        let report = batch_insert(&db, "readings", &readings(95), 10, &mut NoProgress).unwrap();
        assert_eq!(report.chunks, 10);
        assert_eq!(report.committed, 10);
        assert_eq!(report.rows_inserted, 95);
        assert_eq!(report.last_id, Some(95));
    }

    #[test]
    fn unknown_column_fails_before_any_write() {
        let db = db();
        let rows = Table::with_rows(vec!["asset_id".into(), "pressure".into()], vec![]);
        let err = batch_insert(&db, "readings", &rows, 10, &mut NoProgress).unwrap_err();
        assert!(matches!(err, DbError::Precondition(_)));
        assert_eq!(db.max_id("readings").unwrap(), None);
    }

    #[test]
    fn unknown_table_fails_fast() {
        let db = db();
        let err = batch_insert(&db, "nope", &readings(3), 2, &mut NoProgress).unwrap_err();
        assert!(matches!(err, DbError::Precondition(_)));
    }

    #[test]
    fn bad_chunk_is_rolled_back_and_others_commit() {
        let db = db();
        let mut rows = readings(20);
        // NOT NULL violation in the second of four chunks.
        rows.rows[7][0] = Value::Null;
        let report = batch_insert(&db, "readings", &rows, 4, &mut NoProgress).unwrap();
        assert_eq!(report.committed, 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].offset, 5);
        assert_eq!(report.rows_inserted, 15);
        let count = db.query(&crate::builder::Statement::new("SELECT * FROM readings")).unwrap();
        assert_eq!(count.len(), 15);
    }

    #[test]
    fn chunk_above_parameter_limit_is_split_into_statements() {
        let db = db();
        db.conn().set_limit(Limit::SQLITE_LIMIT_VARIABLE_NUMBER, 30);
        assert_eq!(db.max_bound_params(), 30);
        // 100 rows x 3 columns in one chunk: 300 parameters, ten per statement.
        let report = batch_insert(&db, "readings", &readings(100), 1, &mut NoProgress).unwrap();
        assert_eq!(report.chunks, 1);
        assert_eq!(report.committed, 1);
        assert_eq!(report.rows_inserted, 100);
        assert_eq!(report.last_id, Some(100));
    }

    #[test]
    fn failed_statement_rolls_back_the_whole_chunk() {
        let db = db();
        db.conn().set_limit(Limit::SQLITE_LIMIT_VARIABLE_NUMBER, 30);
        let mut rows = readings(40);
        // Last statement of the chunk violates NOT NULL.
        rows.rows[35][0] = Value::Null;
        let report = batch_insert(&db, "readings", &rows, 1, &mut NoProgress).unwrap();
        assert_eq!(report.committed, 0);
        assert_eq!(report.failed(), 1);
        assert_eq!(db.max_id("readings").unwrap(), None);
    }

    #[test]
    fn too_many_columns_for_one_statement_fail_the_chunk() {
        let db = db();
        db.conn().set_limit(Limit::SQLITE_LIMIT_VARIABLE_NUMBER, 2);
        let report = batch_insert(&db, "readings", &readings(4), 1, &mut NoProgress).unwrap();
        assert_eq!(report.committed, 0);
        assert!(report.failures[0].error.contains("bound parameters"));
    }

    #[test]
    fn empty_input_inserts_nothing() {
        let db = db();
        let report = batch_insert(&db, "readings", &readings(0), 10, &mut NoProgress).unwrap();
        assert_eq!(report.chunks, 0);
        assert_eq!(report.last_id, None);
    }

    #[test]
    fn zero_target_is_rejected() {
        let db = db();
        assert!(matches!(
            batch_insert(&db, "readings", &readings(3), 0, &mut NoProgress),
            Err(DbError::Precondition(_))
        ));
    }
}
