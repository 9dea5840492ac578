/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    db,
    directory::Directory,
    error::{PlcError, PlcResult},
    store::{OpStore, SqliteOpStore},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub store: Arc<dyn OpStore>,
    pub directory: Directory,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> PlcResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(
            &config.storage.db_location,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                enable_wal: config.storage.enable_wal,
            },
        )
        .await?;
        db::run_migrations(&db).await?;

        let store: Arc<dyn OpStore> = Arc::new(SqliteOpStore::new(db.clone()));
        let directory = Directory::new(Arc::clone(&store));

        Ok(Self {
            config: Arc::new(config),
            db,
            store,
            directory,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> PlcResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                PlcError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_context_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let data_str = data.to_string_lossy().to_string();
        let config = ServerConfig::from_lookup(|key| match key {
            "PLC_DATA_DIRECTORY" => Some(data_str.clone()),
            _ => None,
        })
        .unwrap();

        let ctx = AppContext::new(config).await.unwrap();
        ctx.store.health_check().await.unwrap();
        assert!(data.join("plc.sqlite").exists());
        assert!(ctx
            .directory
            .document("did:plc:aaaaaaaaaaaaaaaaaaaaaaaa")
            .await
            .unwrap()
            .is_none());
    }
}
