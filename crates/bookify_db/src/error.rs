// --- File: crates/bookify_db/src/error.rs ---
use thiserror::Error;

/// Errors surfaced by the booking ledger.
#[derive(Error, Debug)]
pub enum DbError {
    /// Error with the database configuration
    #[error("Database configuration error: {0}")]
    ConfigError(String),

    /// Error with the database URL
    #[error("Database URL error: {0}")]
    UrlError(String),

    /// Error creating or using the connection pool
    #[error("Database pool error: {0}")]
    PoolError(String),

    /// Error executing a query
    #[error("Database query error: {0}")]
    QueryError(String),

    /// Error managing a transaction
    #[error("Database transaction error: {0}")]
    TransactionError(String),

    /// A uniqueness constraint rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Row not found where one was required
    #[error("Not found: {0}")]
    NotFound(String),

    /// Error encoding or decoding a stored value
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        classify_sqlx_error(err)
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Maps a sqlx error onto the ledger taxonomy. Unique-index violations are
/// the commit path's serialization point, so they get their own kind.
pub fn classify_sqlx_error(err: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(db_err) = &err {
        let message = db_err.message();
        // SQLite: "UNIQUE constraint failed: ..."; Postgres: "duplicate key
        // value violates unique constraint ..."
        if message.contains("UNIQUE constraint failed") || message.contains("duplicate key") {
            return DbError::Conflict(message.to_string());
        }
    }
    DbError::QueryError(err.to_string())
}

impl DbError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }
}

impl From<DbError> for bookify_common::BookifyError {
    fn from(err: DbError) -> Self {
        use bookify_common::BookifyError;
        match err {
            DbError::Conflict(_) => BookifyError::SlotTaken,
            DbError::NotFound(message) => BookifyError::NotFound(message),
            other => BookifyError::Internal(other.to_string()),
        }
    }
}
