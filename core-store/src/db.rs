//! # Database Connection Pool
//!
//! SQLite connection pooling for the review cache database.
//!
//! - **WAL mode** for concurrent readers alongside the single writer
//! - **Foreign keys** enforced so version/note/attachment rows cascade
//! - **Embedded migrations** applied on pool creation
//! - In-memory pools for tests via [`create_test_pool`]

use crate::{Result, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database configuration for the SQLite connection pool.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path or `:memory:` for an in-memory database
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// Number of prepared statements to cache per connection
    pub statement_cache_capacity: usize,
}

impl DatabaseConfig {
    /// Create a configuration backed by a database file.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            statement_cache_capacity: 100,
        }
    }

    /// Create a configuration for an in-memory database (useful for testing).
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            statement_cache_capacity: 100,
        }
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the connection acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Create a configured SQLite connection pool.
///
/// Configures connection options (WAL, foreign keys), creates the pool,
/// runs embedded migrations, and performs a health check.
///
/// # Errors
///
/// Returns an error if the database cannot be opened, migrations fail,
/// or the health check query fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Creating database connection pool"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(StoreError::Database)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true)
        .pragma("cache_size", "-64000")
        .statement_cache_capacity(config.statement_cache_capacity);

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            StoreError::Database(e)
        })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// Create an in-memory pool with migrations applied, for tests.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

/// Apply all pending migrations embedded at compile time.
async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    debug!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Migration failed");
            StoreError::Migration(e.to_string())
        })?;

    Ok(())
}

/// Verify the pool can execute a trivial query.
async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Database health check failed");
        StoreError::Database(e)
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_in_memory_pool() {
        let pool = create_pool(DatabaseConfig::in_memory()).await;
        assert!(pool.is_ok(), "Should create in-memory pool successfully");
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = create_test_pool().await.unwrap();

        let result: (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(result.0, 1, "Foreign keys should be enabled");
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = create_test_pool().await.unwrap();

        for table in ["playlists", "versions", "notes", "attachments"] {
            let result: (i32,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();

            assert_eq!(result.0, 1, "{} table should exist", table);
        }
    }

    #[tokio::test]
    async fn test_database_config_builder() {
        let config = DatabaseConfig::in_memory()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(60));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(60));
    }
}
