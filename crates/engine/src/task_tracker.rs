use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fleet_sync_core::{SyncError, SyncResult};
use fleet_sync_domain::{
    entities::{Node, SyncTask, SyncTaskStatus},
    repositories::SyncTaskRepository,
};
use tracing::{debug, info, warn};

const INTERRUPTED_MESSAGE: &str = "同步被中断";
const RESTART_MESSAGE: &str = "服务重启，同步未完成";

/// 同步任务审计
///
/// 每次同步尝试对应一条任务记录：pending（仅内存）→ running → completed | failed。
/// 任务结束后不再修改，也不会被删除。
#[derive(Clone)]
pub struct SyncTaskTracker {
    task_repo: Arc<dyn SyncTaskRepository>,
    default_sync_interval_seconds: i64,
}

/// 同步计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

impl SyncTaskTracker {
    pub fn new(task_repo: Arc<dyn SyncTaskRepository>, default_sync_interval_seconds: i64) -> Self {
        Self {
            task_repo,
            default_sync_interval_seconds,
        }
    }

    /// 创建一条 running 状态的任务
    pub async fn start(&self, node: &Node) -> SyncResult<SyncTask> {
        let mut task = SyncTask::pending(node);
        task.status = SyncTaskStatus::Running;
        task.start_time = Some(Utc::now());

        let task = self.task_repo.create(&task).await?;
        debug!(task_id = task.id, node_id = node.id, "同步任务开始");
        Ok(task)
    }

    /// 记录列表总数
    pub async fn set_total(&self, task: &mut SyncTask, total: usize) -> SyncResult<()> {
        Self::ensure_open(task)?;
        let mut updated = task.clone();
        updated.total_count = total as i64;
        *task = self.task_repo.update(&updated).await?;
        Ok(())
    }

    /// 写入成功前不修改传入的任务，写入失败后仍可改为 fail
    pub async fn complete(&self, task: &mut SyncTask, counts: SyncCounts) -> SyncResult<()> {
        Self::ensure_open(task)?;
        let mut updated = task.clone();
        updated.status = SyncTaskStatus::Completed;
        updated.total_count = counts.total as i64;
        updated.success_count = counts.success as i64;
        updated.failed_count = counts.failed as i64;
        updated.end_time = Some(Utc::now());

        *task = self.task_repo.update(&updated).await?;
        info!(
            task_id = task.id,
            node_id = task.node_id,
            "节点 {} 同步完成: 成功 {}, 失败 {}, 总计 {}",
            task.node_name,
            counts.success,
            counts.failed,
            counts.total
        );
        Ok(())
    }

    pub async fn fail(&self, task: &mut SyncTask, message: impl Into<String>) -> SyncResult<()> {
        Self::ensure_open(task)?;
        let mut updated = task.clone();
        updated.status = SyncTaskStatus::Failed;
        updated.error_message = message.into();
        updated.end_time = Some(Utc::now());

        *task = self.task_repo.update(&updated).await?;
        warn!(
            task_id = task.id,
            node_id = task.node_id,
            "节点 {} 同步失败: {}",
            task.node_name,
            task.error_message
        );
        Ok(())
    }

    /// 同步被取消时把仍未结束的任务标记为失败
    pub async fn mark_interrupted(&self, task_id: i64) -> SyncResult<()> {
        let Some(mut task) = self.task_repo.find_by_id(task_id).await? else {
            return Err(SyncError::SyncTaskNotFound { id: task_id });
        };
        if task.is_finished() {
            return Ok(());
        }
        self.fail(&mut task, INTERRUPTED_MESSAGE).await
    }

    /// 启动时清理上次进程遗留的未结束任务
    pub async fn fail_unfinished(&self) -> SyncResult<u64> {
        let count = self
            .task_repo
            .fail_unfinished(RESTART_MESSAGE, Utc::now())
            .await?;
        if count > 0 {
            warn!("{} 个同步任务在服务停止时未结束，已标记为失败", count);
        }
        Ok(count)
    }

    fn ensure_open(task: &SyncTask) -> SyncResult<()> {
        if task.is_finished() {
            return Err(SyncError::DatabaseOperation(format!(
                "同步任务 {} 已结束，不能再更新",
                task.id
            )));
        }
        Ok(())
    }

    pub async fn last_task(&self, node_id: i64) -> SyncResult<Option<SyncTask>> {
        self.task_repo.find_latest_by_node(node_id).await
    }

    /// 最近的任务，新的在前
    pub async fn recent(&self, limit: i64) -> SyncResult<Vec<SyncTask>> {
        self.task_repo.list_recent(limit).await
    }

    pub async fn by_node(&self, node_id: i64, limit: i64) -> SyncResult<Vec<SyncTask>> {
        self.task_repo.list_by_node(node_id, limit).await
    }

    /// 判断节点是否到了自动同步的时间
    ///
    /// 没有历史任务时立即同步；最近任务没有开始时间时不同步；
    /// 否则距上次开始的时间不小于同步间隔才同步。
    pub fn should_sync(&self, node: &Node, last: Option<&SyncTask>, now: DateTime<Utc>) -> bool {
        let Some(last) = last else {
            return true;
        };
        let Some(started) = last.start_time else {
            return false;
        };

        let interval = if node.sync_interval > 0 {
            node.sync_interval
        } else {
            self.default_sync_interval_seconds
        };
        now - started >= Duration::seconds(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_sync_testing_utils::{builders::NodeBuilder, mocks::MockSyncTaskRepository};

    fn tracker() -> (SyncTaskTracker, Arc<MockSyncTaskRepository>) {
        let repo = Arc::new(MockSyncTaskRepository::new());
        (SyncTaskTracker::new(repo.clone(), 300), repo)
    }

    fn started_at(node: &Node, start: Option<DateTime<Utc>>) -> SyncTask {
        let mut task = SyncTask::pending(node);
        task.start_time = start;
        task
    }

    #[test]
    fn test_should_sync_without_history() {
        let (tracker, _) = tracker();
        let node = NodeBuilder::new().build();
        assert!(tracker.should_sync(&node, None, Utc::now()));
    }

    #[test]
    fn test_should_not_sync_when_last_task_never_started() {
        let (tracker, _) = tracker();
        let node = NodeBuilder::new().build();
        let last = started_at(&node, None);
        assert!(!tracker.should_sync(&node, Some(&last), Utc::now()));
    }

    #[test]
    fn test_should_sync_respects_interval() {
        let (tracker, _) = tracker();
        let node = NodeBuilder::new().with_sync_interval(60).build();
        let now = Utc::now();

        let recent = started_at(&node, Some(now - Duration::seconds(59)));
        assert!(!tracker.should_sync(&node, Some(&recent), now));

        let due = started_at(&node, Some(now - Duration::seconds(60)));
        assert!(tracker.should_sync(&node, Some(&due), now));
    }

    #[test]
    fn test_should_sync_uses_default_interval() {
        let (tracker, _) = tracker();
        let node = NodeBuilder::new().with_sync_interval(0).build();
        let now = Utc::now();

        let last = started_at(&node, Some(now - Duration::seconds(299)));
        assert!(!tracker.should_sync(&node, Some(&last), now));

        let last = started_at(&node, Some(now - Duration::seconds(300)));
        assert!(tracker.should_sync(&node, Some(&last), now));
    }

    #[tokio::test]
    async fn test_lifecycle_and_refuse_after_end() {
        let (tracker, repo) = tracker();
        let node = NodeBuilder::new().build();

        let mut task = tracker.start(&node).await.unwrap();
        assert_eq!(task.status, SyncTaskStatus::Running);
        assert!(task.start_time.is_some());
        assert_eq!(task.success_count, 0);

        tracker.set_total(&mut task, 4).await.unwrap();
        tracker
            .complete(
                &mut task,
                SyncCounts {
                    total: 4,
                    success: 3,
                    failed: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(task.status, SyncTaskStatus::Completed);
        assert!(task.end_time.is_some());

        let err = tracker.fail(&mut task, "late").await.unwrap_err();
        assert!(matches!(err, SyncError::DatabaseOperation(_)));

        let stored = repo.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, SyncTaskStatus::Completed);
        assert_eq!(stored[0].failed_count, 1);
        assert_eq!(stored[0].error_message, "");
    }

    #[tokio::test]
    async fn test_fail_records_message() {
        let (tracker, _) = tracker();
        let node = NodeBuilder::new().build();

        let mut task = tracker.start(&node).await.unwrap();
        tracker.fail(&mut task, "获取容器列表失败: 超时").await.unwrap();

        let last = tracker.last_task(node.id).await.unwrap().unwrap();
        assert_eq!(last.status, SyncTaskStatus::Failed);
        assert_eq!(last.error_message, "获取容器列表失败: 超时");
        assert!(last.is_finished());
    }

    #[tokio::test]
    async fn test_mark_interrupted_only_touches_open_tasks() {
        let (tracker, repo) = tracker();
        let node = NodeBuilder::new().build();

        let open = tracker.start(&node).await.unwrap();
        let mut done = tracker.start(&node).await.unwrap();
        tracker.complete(&mut done, SyncCounts::default()).await.unwrap();

        tracker.mark_interrupted(open.id).await.unwrap();
        tracker.mark_interrupted(done.id).await.unwrap();

        let stored = repo.all();
        assert_eq!(stored[0].status, SyncTaskStatus::Failed);
        assert_eq!(stored[0].error_message, "同步被中断");
        assert_eq!(stored[1].status, SyncTaskStatus::Completed);

        let err = tracker.mark_interrupted(42).await.unwrap_err();
        assert!(matches!(err, SyncError::SyncTaskNotFound { id: 42 }));
    }

    #[tokio::test]
    async fn test_fail_unfinished_closes_leftover_tasks() {
        let (tracker, repo) = tracker();
        let node = NodeBuilder::new().build();
        tracker.start(&node).await.unwrap();
        tracker.start(&node).await.unwrap();

        assert_eq!(tracker.fail_unfinished().await.unwrap(), 2);
        assert!(repo
            .all()
            .iter()
            .all(|t| t.status == SyncTaskStatus::Failed && t.is_finished()));
        assert_eq!(tracker.fail_unfinished().await.unwrap(), 0);
    }
}
