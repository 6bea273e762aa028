// --- File: crates/bookify_db/src/client.rs ---
//! Connection handling for the booking ledger.
//!
//! The ledger speaks through SQLx's `Any` driver so the same repository
//! queries run against SQLite (development, tests) and Postgres. SQLite
//! ledger files are bootstrapped on first start because the `Any` driver
//! has no create-if-missing switch.

use crate::error::DbError;
use bookify_config::{AppConfig, DatabaseConfig};
use sqlx::pool::PoolOptions;
use sqlx::{Pool, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A transaction on the ledger pool.
pub type DbTransaction<'a> = Transaction<'a, sqlx::Any>;

/// Shared handle to the ledger's connection pool. Cheap to clone; every
/// repository holds one.
#[derive(Debug, Clone)]
pub struct DbClient {
    pool: Pool<sqlx::Any>,
}

impl DbClient {
    /// Opens the pool described by the application configuration.
    ///
    /// # Errors
    ///
    /// Fails when the `database` section is absent, the URL is unusable, or
    /// the first connection cannot be established.
    pub async fn new(config: &Arc<AppConfig>) -> Result<Self, DbError> {
        let db_config = config.database.as_ref().ok_or_else(|| {
            DbError::ConfigError("no database section in configuration".to_string())
        })?;
        Self::from_config(db_config).await
    }

    /// Opens the pool for a database configuration section.
    pub async fn from_config(db_config: &DatabaseConfig) -> Result<Self, DbError> {
        Self::from_url(&db_config.url).await
    }

    /// Opens the pool for a raw connection URL.
    pub async fn from_url(db_url: &str) -> Result<Self, DbError> {
        if db_url.trim().is_empty() {
            return Err(DbError::UrlError("database url is empty".to_string()));
        }

        // Makes the compiled-in drivers visible to the Any driver.
        sqlx::any::install_default_drivers();

        if let Some(file_path) = sqlite_file_path(db_url) {
            bootstrap_sqlite_file(file_path)?;
        }

        let options = sqlx::any::AnyConnectOptions::from_str(db_url)
            .map_err(|e| DbError::UrlError(e.to_string()))?;

        let pool = PoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(300))
            .connect_with(options)
            .await
            .map_err(|e| DbError::PoolError(e.to_string()))?;

        info!("Ledger pool ready");
        Ok(Self { pool })
    }

    /// The underlying connection pool, for repository queries.
    pub fn pool(&self) -> &Pool<sqlx::Any> {
        &self.pool
    }

    /// Starts a transaction. The booking insert runs inside one so the
    /// uniqueness gate and the commit are a single step.
    pub async fn begin(&self) -> Result<DbTransaction<'_>, DbError> {
        self.pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionError(e.to_string()))
    }

    /// Runs one statement that returns no rows (schema setup, flag flips).
    pub async fn execute(&self, statement: &str) -> Result<u64, DbError> {
        sqlx::query(statement)
            .execute(&self.pool)
            .await
            .map(|done| done.rows_affected())
            .map_err(|e| DbError::QueryError(e.to_string()))
    }

    /// Probe behind the health endpoint.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// Extracts the file path from a `sqlite:` / `sqlite://` URL. In-memory
/// databases and other schemes yield `None`.
fn sqlite_file_path(db_url: &str) -> Option<&str> {
    let rest = db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"))?;
    if rest.is_empty() || rest.contains(":memory:") {
        return None;
    }
    Some(rest)
}

/// Creates the ledger file (and its directory) ahead of the first connect.
fn bootstrap_sqlite_file(file_path: &str) -> Result<(), DbError> {
    let path = Path::new(file_path);
    if path.exists() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::PoolError(format!(
                    "cannot create ledger directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    debug!("Bootstrapping ledger file {}", file_path);
    std::fs::File::create(path).map_err(|e| {
        DbError::PoolError(format!("cannot create ledger file {}: {}", file_path, e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_urls_resolve_to_file_paths() {
        assert_eq!(sqlite_file_path("sqlite://ledger.db"), Some("ledger.db"));
        assert_eq!(sqlite_file_path("sqlite:ledger.db"), Some("ledger.db"));
        assert_eq!(
            sqlite_file_path("sqlite://data/ledger.db"),
            Some("data/ledger.db")
        );
    }

    #[test]
    fn non_file_urls_are_left_alone() {
        assert_eq!(sqlite_file_path("sqlite::memory:"), None);
        assert_eq!(sqlite_file_path("sqlite://"), None);
        assert_eq!(sqlite_file_path("postgres://localhost/bookify"), None);
    }
}
