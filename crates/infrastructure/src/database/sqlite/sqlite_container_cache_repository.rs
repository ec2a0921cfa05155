use async_trait::async_trait;
use fleet_sync_core::{SyncError, SyncResult};
use fleet_sync_domain::{
    entities::{ContainerCache, ContainerCacheUpdate},
    repositories::ContainerCacheRepository,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;

const CONTAINER_COLUMNS: &str = "id, node_id, node_name, hostname, status, ipv4, ipv6, image, cpus, memory, disk, traffic_limit, ingress, egress, cpu_usage, memory_usage, memory_total, disk_usage, disk_total, traffic_total, traffic_in, traffic_out, last_sync, sync_error, created_at, updated_at";

pub struct SqliteContainerCacheRepository {
    pool: SqlitePool,
}

impl SqliteContainerCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_container(row: &sqlx::sqlite::SqliteRow) -> SyncResult<ContainerCache> {
        Ok(ContainerCache {
            id: row.try_get("id")?,
            node_id: row.try_get("node_id")?,
            node_name: row.try_get("node_name")?,
            hostname: row.try_get("hostname")?,
            status: row.try_get("status")?,
            ipv4: row.try_get("ipv4")?,
            ipv6: row.try_get("ipv6")?,
            image: row.try_get("image")?,
            cpus: row.try_get("cpus")?,
            memory: row.try_get("memory")?,
            disk: row.try_get("disk")?,
            traffic_limit: row.try_get("traffic_limit")?,
            ingress: row.try_get("ingress")?,
            egress: row.try_get("egress")?,
            cpu_usage: row.try_get("cpu_usage")?,
            memory_usage: row.try_get("memory_usage")?,
            memory_total: row.try_get("memory_total")?,
            disk_usage: row.try_get("disk_usage")?,
            disk_total: row.try_get("disk_total")?,
            traffic_total: row.try_get("traffic_total")?,
            traffic_in: row.try_get("traffic_in")?,
            traffic_out: row.try_get("traffic_out")?,
            last_sync: row.try_get("last_sync")?,
            sync_error: row.try_get("sync_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ContainerCacheRepository for SqliteContainerCacheRepository {
    async fn upsert(&self, update: &ContainerCacheUpdate) -> SyncResult<ContainerCache> {
        // 描述性字段为 NULL 时保留原值，计数器直接覆盖
        let sql = format!(
            r#"
            INSERT INTO container_cache (
                node_id, node_name, hostname, status, ipv4, ipv6, image, cpus, memory, disk,
                traffic_limit, ingress, egress, cpu_usage, memory_usage, memory_total, disk_usage,
                disk_total, traffic_total, traffic_in, traffic_out, last_sync, sync_error, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, COALESCE($4, ''), COALESCE($5, ''), COALESCE($6, ''), COALESCE($7, ''),
                COALESCE($8, 0), COALESCE($9, ''), COALESCE($10, ''), COALESCE($11, 0),
                COALESCE($12, ''), COALESCE($13, ''), $14, $15, $16, $17, $18, $19, $20, $21,
                $22, '', $22, $22
            )
            ON CONFLICT(node_id, hostname) DO UPDATE SET
                node_name = excluded.node_name,
                status = COALESCE($4, container_cache.status),
                ipv4 = COALESCE($5, container_cache.ipv4),
                ipv6 = COALESCE($6, container_cache.ipv6),
                image = COALESCE($7, container_cache.image),
                cpus = COALESCE($8, container_cache.cpus),
                memory = COALESCE($9, container_cache.memory),
                disk = COALESCE($10, container_cache.disk),
                traffic_limit = COALESCE($11, container_cache.traffic_limit),
                ingress = COALESCE($12, container_cache.ingress),
                egress = COALESCE($13, container_cache.egress),
                cpu_usage = excluded.cpu_usage,
                memory_usage = excluded.memory_usage,
                memory_total = excluded.memory_total,
                disk_usage = excluded.disk_usage,
                disk_total = excluded.disk_total,
                traffic_total = excluded.traffic_total,
                traffic_in = excluded.traffic_in,
                traffic_out = excluded.traffic_out,
                last_sync = excluded.last_sync,
                sync_error = '',
                updated_at = excluded.updated_at
            RETURNING {CONTAINER_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(update.node_id)
            .bind(&update.node_name)
            .bind(&update.hostname)
            .bind(&update.status)
            .bind(&update.ipv4)
            .bind(&update.ipv6)
            .bind(&update.image)
            .bind(update.cpus)
            .bind(&update.memory)
            .bind(&update.disk)
            .bind(update.traffic_limit)
            .bind(&update.ingress)
            .bind(&update.egress)
            .bind(update.cpu_usage)
            .bind(update.memory_usage)
            .bind(update.memory_total)
            .bind(update.disk_usage)
            .bind(update.disk_total)
            .bind(update.traffic_total)
            .bind(update.traffic_in)
            .bind(update.traffic_out)
            .bind(update.last_sync)
            .fetch_one(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        let cache = Self::row_to_container(&row)?;
        debug!(
            "更新容器缓存成功: 节点 {} 容器 {}",
            cache.node_id, cache.hostname
        );
        Ok(cache)
    }

    async fn find(&self, node_id: i64, hostname: &str) -> SyncResult<Option<ContainerCache>> {
        let sql = format!(
            "SELECT {CONTAINER_COLUMNS} FROM container_cache WHERE node_id = $1 AND hostname = $2"
        );
        let row = sqlx::query(&sql)
            .bind(node_id)
            .bind(hostname)
            .fetch_optional(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        row.as_ref().map(Self::row_to_container).transpose()
    }

    async fn find_by_node(&self, node_id: i64) -> SyncResult<Vec<ContainerCache>> {
        let sql = format!(
            "SELECT {CONTAINER_COLUMNS} FROM container_cache WHERE node_id = $1 ORDER BY hostname"
        );
        let rows = sqlx::query(&sql)
            .bind(node_id)
            .fetch_all(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        rows.iter().map(Self::row_to_container).collect()
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> SyncResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(SyncError::Database)?;
        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM container_cache WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(SyncError::Database)?;
            deleted += result.rows_affected();
        }
        tx.commit().await.map_err(SyncError::Database)?;

        debug!("批量删除容器缓存 {} 条", deleted);
        Ok(deleted)
    }

    async fn delete_by_node(&self, node_id: i64) -> SyncResult<u64> {
        let result = sqlx::query("DELETE FROM container_cache WHERE node_id = $1")
            .bind(node_id)
            .execute(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        debug!(
            "删除节点 {} 的全部容器缓存 {} 条",
            node_id,
            result.rows_affected()
        );
        Ok(result.rows_affected())
    }
}
