use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_sync_core::{SyncError, SyncResult};
use fleet_sync_domain::{entities::NodeInfoCache, repositories::NodeInfoCacheRepository};
use sqlx::{Row, SqlitePool};
use tracing::debug;

const INFO_COLUMNS: &str = "id, node_id, system_info, last_sync, created_at, updated_at";

pub struct SqliteNodeInfoCacheRepository {
    pool: SqlitePool,
}

impl SqliteNodeInfoCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_info(row: &sqlx::sqlite::SqliteRow) -> SyncResult<NodeInfoCache> {
        Ok(NodeInfoCache {
            id: row.try_get("id")?,
            node_id: row.try_get("node_id")?,
            system_info: row.try_get("system_info")?,
            last_sync: row.try_get("last_sync")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl NodeInfoCacheRepository for SqliteNodeInfoCacheRepository {
    async fn upsert(
        &self,
        node_id: i64,
        system_info: &str,
        synced_at: DateTime<Utc>,
    ) -> SyncResult<NodeInfoCache> {
        let sql = format!(
            r#"
            INSERT INTO node_info_cache (node_id, system_info, last_sync, created_at, updated_at)
            VALUES ($1, $2, $3, $3, $3)
            ON CONFLICT(node_id) DO UPDATE SET
                system_info = excluded.system_info,
                last_sync = excluded.last_sync,
                updated_at = excluded.updated_at
            RETURNING {INFO_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(node_id)
            .bind(system_info)
            .bind(synced_at)
            .fetch_one(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        debug!("更新节点 {} 系统信息缓存", node_id);
        Self::row_to_info(&row)
    }

    async fn find_by_node(&self, node_id: i64) -> SyncResult<Option<NodeInfoCache>> {
        let sql = format!("SELECT {INFO_COLUMNS} FROM node_info_cache WHERE node_id = $1");
        let row = sqlx::query(&sql)
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        row.as_ref().map(Self::row_to_info).transpose()
    }

    async fn delete_by_node(&self, node_id: i64) -> SyncResult<bool> {
        let result = sqlx::query("DELETE FROM node_info_cache WHERE node_id = $1")
            .bind(node_id)
            .execute(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
