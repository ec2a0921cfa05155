use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use fleet_sync_core::{config::models::DatabaseConfig, SyncError, SyncResult};
use fleet_sync_domain::repositories::{
    ContainerCacheRepository, NodeInfoCacheRepository, NodeRepository, SyncTaskRepository,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use super::sqlite::{
    SqliteContainerCacheRepository, SqliteNodeInfoCacheRepository, SqliteNodeRepository,
    SqliteSyncTaskRepository,
};

/// SQLite 数据库管理器
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> SyncResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(SyncError::Database)?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));

        if config.is_in_memory() {
            // 每个连接都是独立的内存库，只能保留单连接
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            pool_options = pool_options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                .max_lifetime(Duration::from_secs(1800));
        }

        let options = if config.is_in_memory() {
            options
        } else {
            options.journal_mode(SqliteJournalMode::Wal)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(SyncError::Database)?;

        info!("数据库连接池已创建: {}", config.url);
        Ok(Self { pool })
    }

    /// 内存数据库，主要用于测试
    pub async fn in_memory() -> SyncResult<Self> {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        };
        Self::new(&config).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> SyncResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SyncError::DatabaseOperation(format!("数据库迁移失败: {e}")))?;
        info!("数据库迁移完成");
        Ok(())
    }

    pub async fn health_check(&self) -> SyncResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(SyncError::Database)?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn node_repository(&self) -> Arc<dyn NodeRepository> {
        Arc::new(SqliteNodeRepository::new(self.pool.clone()))
    }

    pub fn container_cache_repository(&self) -> Arc<dyn ContainerCacheRepository> {
        Arc::new(SqliteContainerCacheRepository::new(self.pool.clone()))
    }

    pub fn sync_task_repository(&self) -> Arc<dyn SyncTaskRepository> {
        Arc::new(SqliteSyncTaskRepository::new(self.pool.clone()))
    }

    pub fn node_info_cache_repository(&self) -> Arc<dyn NodeInfoCacheRepository> {
        Arc::new(SqliteNodeInfoCacheRepository::new(self.pool.clone()))
    }
}
