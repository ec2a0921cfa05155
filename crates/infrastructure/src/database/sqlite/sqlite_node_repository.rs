use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_sync_core::{SyncError, SyncResult};
use fleet_sync_domain::{
    entities::{Node, NodeFilter, NodeStatus},
    repositories::NodeRepository,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

const NODE_COLUMNS: &str = "id, name, description, address, api_key, status, last_check, auto_sync, sync_interval, batch_size, batch_interval, created_at, updated_at";

pub struct SqliteNodeRepository {
    pool: SqlitePool,
}

impl SqliteNodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_node(row: &sqlx::sqlite::SqliteRow) -> SyncResult<Node> {
        Ok(Node {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            address: row.try_get("address")?,
            api_key: row.try_get("api_key")?,
            status: row.try_get("status")?,
            last_check: row.try_get("last_check")?,
            auto_sync: row.try_get("auto_sync")?,
            sync_interval: row.try_get("sync_interval")?,
            batch_size: row.try_get("batch_size")?,
            batch_interval: row.try_get("batch_interval")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl NodeRepository for SqliteNodeRepository {
    async fn create(&self, node: &Node) -> SyncResult<Node> {
        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO nodes (name, description, address, api_key, status, last_check, auto_sync, sync_interval, batch_size, batch_interval, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING {NODE_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(&node.name)
            .bind(&node.description)
            .bind(&node.address)
            .bind(&node.api_key)
            .bind(node.status)
            .bind(node.last_check)
            .bind(node.auto_sync)
            .bind(node.sync_interval)
            .bind(node.batch_size)
            .bind(node.batch_interval)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        let created = Self::row_to_node(&row)?;
        debug!("创建节点成功: {} (ID: {})", created.name, created.id);
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> SyncResult<Option<Node>> {
        let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        row.as_ref().map(Self::row_to_node).transpose()
    }

    async fn list(&self, filter: &NodeFilter) -> SyncResult<Vec<Node>> {
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE ($1 IS NULL OR status = $1) AND ($2 IS NULL OR auto_sync = $2) ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.status)
            .bind(filter.auto_sync)
            .fetch_all(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        rows.iter().map(Self::row_to_node).collect()
    }

    async fn update_status(
        &self,
        id: i64,
        status: NodeStatus,
        checked_at: DateTime<Utc>,
    ) -> SyncResult<()> {
        let result = sqlx::query(
            "UPDATE nodes SET status = $2, last_check = $3, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(checked_at)
        .execute(&self.pool)
        .await
        .map_err(SyncError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SyncError::NodeNotFound { id });
        }

        debug!("更新节点 {} 状态为 {}", id, status);
        Ok(())
    }

    async fn delete_with_dependents(&self, id: i64) -> SyncResult<bool> {
        let mut tx = self.pool.begin().await.map_err(SyncError::Database)?;

        for table in ["container_cache", "node_info_cache", "sync_tasks"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE node_id = $1"))
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(SyncError::Database)?;
        }

        let result = sqlx::query("DELETE FROM nodes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(SyncError::Database)?;

        tx.commit().await.map_err(SyncError::Database)?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("已删除节点 {} 及其缓存和同步记录", id);
        }
        Ok(deleted)
    }
}
