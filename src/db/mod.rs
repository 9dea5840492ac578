/// Database layer for the PLC ledger
///
/// Manages the SQLite connection pool and the embedded schema migrations
/// backing the operation store.
use crate::error::{PlcError, PlcResult};
use sqlx::sqlite::SqlitePool;
use std::path::Path;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> PlcResult<SqlitePool> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                })
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await
        .map_err(PlcError::Database)?;

    Ok(pool)
}

/// Run migrations embedded at compile time from ./migrations
pub async fn run_migrations(pool: &SqlitePool) -> PlcResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> PlcResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(PlcError::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_pool_and_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("plc.sqlite");

        let pool = create_pool(&path, DatabaseOptions::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        test_connection(&pool).await.unwrap();

        // migrations are idempotent
        run_migrations(&pool).await.unwrap();
        assert!(path.exists());
    }
}
