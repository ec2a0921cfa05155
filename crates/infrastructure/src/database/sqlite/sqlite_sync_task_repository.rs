use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_sync_core::{SyncError, SyncResult};
use fleet_sync_domain::{
    entities::{SyncTask, SyncTaskStatus},
    repositories::SyncTaskRepository,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;

const TASK_COLUMNS: &str = "id, node_id, node_name, status, total_count, success_count, failed_count, start_time, end_time, error_message, created_at, updated_at";

pub struct SqliteSyncTaskRepository {
    pool: SqlitePool,
}

impl SqliteSyncTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> SyncResult<SyncTask> {
        Ok(SyncTask {
            id: row.try_get("id")?,
            node_id: row.try_get("node_id")?,
            node_name: row.try_get("node_name")?,
            status: row.try_get("status")?,
            total_count: row.try_get("total_count")?,
            success_count: row.try_get("success_count")?,
            failed_count: row.try_get("failed_count")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl SyncTaskRepository for SqliteSyncTaskRepository {
    async fn create(&self, task: &SyncTask) -> SyncResult<SyncTask> {
        let sql = format!(
            r#"
            INSERT INTO sync_tasks (node_id, node_name, status, total_count, success_count, failed_count, start_time, end_time, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING {TASK_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(task.node_id)
            .bind(&task.node_name)
            .bind(task.status)
            .bind(task.total_count)
            .bind(task.success_count)
            .bind(task.failed_count)
            .bind(task.start_time)
            .bind(task.end_time)
            .bind(&task.error_message)
            .bind(task.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        let created = Self::row_to_task(&row)?;
        debug!(
            "创建同步任务成功: {} (节点 {})",
            created.id, created.node_id
        );
        Ok(created)
    }

    async fn update(&self, task: &SyncTask) -> SyncResult<SyncTask> {
        // 已结束的任务不再修改
        let sql = format!(
            r#"
            UPDATE sync_tasks
            SET status = $2, total_count = $3, success_count = $4, failed_count = $5,
                start_time = $6, end_time = $7, error_message = $8, updated_at = $9
            WHERE id = $1 AND end_time IS NULL
            RETURNING {TASK_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(task.id)
            .bind(task.status)
            .bind(task.total_count)
            .bind(task.success_count)
            .bind(task.failed_count)
            .bind(task.start_time)
            .bind(task.end_time)
            .bind(&task.error_message)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        match row {
            Some(row) => {
                let updated = Self::row_to_task(&row)?;
                debug!("更新同步任务 {} 状态为 {}", updated.id, updated.status);
                Ok(updated)
            }
            None => match self.find_by_id(task.id).await? {
                Some(_) => Err(SyncError::DatabaseOperation(format!(
                    "同步任务 {} 已结束，不能再更新",
                    task.id
                ))),
                None => Err(SyncError::SyncTaskNotFound { id: task.id }),
            },
        }
    }

    async fn find_by_id(&self, id: i64) -> SyncResult<Option<SyncTask>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM sync_tasks WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn find_latest_by_node(&self, node_id: i64) -> SyncResult<Option<SyncTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM sync_tasks WHERE node_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn list_recent(&self, limit: i64) -> SyncResult<Vec<SyncTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM sync_tasks ORDER BY created_at DESC, id DESC LIMIT $1"
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn list_by_node(&self, node_id: i64, limit: i64) -> SyncResult<Vec<SyncTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM sync_tasks WHERE node_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(node_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(SyncError::Database)?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn fail_unfinished(&self, message: &str, ended_at: DateTime<Utc>) -> SyncResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_tasks
            SET status = $1, end_time = $2, error_message = $3, updated_at = $2
            WHERE end_time IS NULL
            "#,
        )
        .bind(SyncTaskStatus::Failed)
        .bind(ended_at)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(SyncError::Database)?;

        let affected = result.rows_affected();
        if affected > 0 {
            debug!("标记 {} 个未结束的同步任务为失败", affected);
        }
        Ok(affected)
    }
}
