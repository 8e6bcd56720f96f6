use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

/// SQLite primary result codes that mean the engine itself is not usable right now.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CANTOPEN: i32 = 14;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("corrupt data in {table}.{column}: {reason}")]
    CorruptData {
        table: &'static str,
        column: &'static str,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(SqlxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Actor error: {0}")]
    ActorError(String),
}

impl StoreError {
    pub fn corrupt(table: &'static str, column: &'static str, reason: impl ToString) -> Self {
        StoreError::CorruptData {
            table,
            column,
            reason: reason.to_string(),
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey(_))
    }
}

impl From<SqlxError> for StoreError {
    fn from(e: SqlxError) -> Self {
        match &e {
            SqlxError::Database(db) if db.is_unique_violation() => {
                StoreError::DuplicateKey(db.message().to_string())
            }
            SqlxError::Database(db) if db.is_foreign_key_violation() => {
                StoreError::ValidationError(db.message().to_string())
            }
            SqlxError::Database(db)
                if matches!(
                    primary_code(db.code().as_deref()),
                    Some(SQLITE_BUSY | SQLITE_LOCKED | SQLITE_CANTOPEN)
                ) =>
            {
                StoreError::StorageUnavailable(db.message().to_string())
            }
            SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => {
                StoreError::StorageUnavailable(e.to_string())
            }
            _ => StoreError::Database(e),
        }
    }
}

/// Extended codes (e.g. `517` for BUSY_SNAPSHOT) carry the primary code in the low byte.
fn primary_code(code: Option<&str>) -> Option<i32> {
    code?.parse::<i32>().ok().map(|c| c & 0xff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_failures_are_storage_unavailable() {
        let err: StoreError = SqlxError::PoolTimedOut.into();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));

        let err: StoreError = SqlxError::PoolClosed.into();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
    }

    #[test]
    fn extended_codes_reduce_to_primary() {
        assert_eq!(primary_code(Some("5")), Some(SQLITE_BUSY));
        assert_eq!(primary_code(Some("517")), Some(SQLITE_BUSY));
        assert_eq!(primary_code(Some("2067")), Some(19));
        assert_eq!(primary_code(Some("x")), None);
        assert_eq!(primary_code(None), None);
    }

    #[test]
    fn missing_row_passes_through() {
        let err: StoreError = SqlxError::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(SqlxError::RowNotFound)));
    }

    #[test]
    fn corrupt_data_names_its_column() {
        let err = StoreError::corrupt("settings", "value", "expected value at line 1");
        assert_eq!(
            err.to_string(),
            "corrupt data in settings.value: expected value at line 1"
        );
    }
}
