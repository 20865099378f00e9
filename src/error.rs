use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

/// Failure kinds surfaced by the data-access layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DbError {
    /// Store unreachable or unopenable.
    #[error("connection error: {0}")]
    Connection(String),
    /// Caller contract violated: missing identifying parameters, unknown table or column.
    #[error("precondition failed: {0}")]
    Precondition(String),
    /// Value outside an enumerated valid set, or input of the wrong shape.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Uniqueness constraint violated.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Any other store-reported failure.
    #[error("execution error: {0}")]
    Execution(String),
}

impl DbError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        // The statement text can be arbitrarily long; keep only where it broke.
        if let rusqlite::Error::SqlInputError { msg, offset, .. } = &err {
            return DbError::Execution(format!("{msg} at offset {offset}"));
        }
        if let rusqlite::Error::SqliteFailure(code, _) = &err {
            if code.code == ErrorCode::ConstraintViolation
                && matches!(
                    code.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
            {
                return DbError::Conflict(err.to_string());
            }
        }
        DbError::Execution(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn unique_violation_is_conflict() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        assert!(DbError::from(err).is_conflict());
    }

    #[test]
    fn unknown_table_is_execution() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.execute("INSERT INTO nowhere VALUES (1)", []).unwrap_err();
        assert!(matches!(DbError::from(err), DbError::Execution(_)));
    }

    #[test]
    fn malformed_statement_error_omits_the_statement() {
        let conn = Connection::open_in_memory().unwrap();
        let sql = format!("SELECT '{}' FROM", "x".repeat(5_000));
        let err = DbError::from(conn.execute(&sql, []).unwrap_err());
        let DbError::Execution(message) = &err else {
            panic!("expected an execution error, got {err:?}");
        };
        assert!(message.len() < 200, "{message}");
        assert!(!message.contains("xxxx"), "{message}");
    }
}
