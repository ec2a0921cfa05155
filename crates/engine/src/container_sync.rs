use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fleet_sync_core::{config::models::SyncConfig, SyncError, SyncResult};
use fleet_sync_domain::{
    entities::{Node, NodeFilter, NodeSyncStatus, SyncTask, SyncTaskStatus},
    ports::{ApiMethod, NodeApi},
    repositories::{ContainerCacheRepository, NodeRepository, SyncTaskRepository},
};
use fleet_sync_infrastructure::observability::SyncMetrics;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::batch_fetcher::{entry_hostname, listing_hostnames, BatchFetcher, BatchPlan};
use crate::cache_upserter::CacheUpserter;
use crate::sync_guard::SyncGuard;
use crate::task_tracker::{SyncCounts, SyncTaskTracker};

/// 节点容器缓存列表
pub const LISTING_PATH: &str = "/api/cache/containers";
/// 让节点重建自身的容器缓存
pub const REFRESH_PATH: &str = "/api/cache/containers/refresh";

/// 同步方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// 读取列表后逐个拉取容器详情
    Incremental,
    /// 先让节点刷新缓存，再直接写入列表中的数据
    FullRefresh,
}

/// 同步触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Manual,
    Auto,
}

impl std::fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncTrigger::Manual => f.write_str("手动"),
            SyncTrigger::Auto => f.write_str("自动"),
        }
    }
}

/// 节点同步服务接口
#[async_trait]
pub trait NodeSyncService: Send + Sync {
    /// 同步一个节点，节点不存在或正在同步时立即拒绝
    async fn sync_node(
        &self,
        node_id: i64,
        mode: SyncMode,
        trigger: SyncTrigger,
    ) -> SyncResult<SyncTask>;

    /// 节点是否正在同步
    fn is_syncing(&self, node_id: i64) -> bool;
}

/// 容器同步服务
pub struct ContainerSyncService {
    node_repo: Arc<dyn NodeRepository>,
    node_api: Arc<dyn NodeApi>,
    guard: Arc<SyncGuard>,
    upserter: CacheUpserter,
    fetcher: BatchFetcher,
    tracker: SyncTaskTracker,
    config: SyncConfig,
    metrics: SyncMetrics,
}

impl ContainerSyncService {
    pub fn new(
        node_repo: Arc<dyn NodeRepository>,
        container_repo: Arc<dyn ContainerCacheRepository>,
        task_repo: Arc<dyn SyncTaskRepository>,
        node_api: Arc<dyn NodeApi>,
        guard: Arc<SyncGuard>,
        config: SyncConfig,
        metrics: SyncMetrics,
    ) -> Self {
        let upserter = CacheUpserter::new(container_repo);
        let fetcher = BatchFetcher::new(Arc::clone(&node_api), upserter.clone());
        let tracker = SyncTaskTracker::new(task_repo, config.default_sync_interval_seconds);

        Self {
            node_repo,
            node_api,
            guard,
            upserter,
            fetcher,
            tracker,
            config,
            metrics,
        }
    }

    pub fn tracker(&self) -> &SyncTaskTracker {
        &self.tracker
    }

    /// 依次同步所有活动节点，节点之间停顿
    pub async fn sync_all_nodes(&self) -> SyncResult<Vec<SyncTask>> {
        let nodes = self.node_repo.list(&NodeFilter::active()).await?;
        info!("开始同步 {} 个活动节点", nodes.len());

        let mut tasks = Vec::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            info!("处理节点 {}/{}: {}", index + 1, nodes.len(), node.name);
            match self
                .sync_node(node.id, SyncMode::Incremental, SyncTrigger::Manual)
                .await
            {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(node_id = node.id, "节点 {} 同步未执行: {}", node.name, e),
            }

            if index + 1 < nodes.len() {
                let pause = self.node_pause(node);
                if !pause.is_zero() {
                    debug!("等待 {:?} 后处理下一个节点", pause);
                    tokio::time::sleep(pause).await;
                }
            }
        }

        info!("所有节点同步完成");
        Ok(tasks)
    }

    /// 所有节点及其最近一次同步任务
    pub async fn node_sync_status(&self) -> SyncResult<Vec<NodeSyncStatus>> {
        let nodes = self.node_repo.list(&NodeFilter::default()).await?;
        let mut statuses = Vec::with_capacity(nodes.len());
        for node in nodes {
            let last_task = self.tracker.last_task(node.id).await?;
            statuses.push(NodeSyncStatus { node, last_task });
        }
        Ok(statuses)
    }

    fn node_pause(&self, node: &Node) -> Duration {
        let seconds = if node.batch_interval > 0 {
            node.batch_interval
        } else {
            self.config.node_pause_seconds.max(0)
        };
        Duration::from_secs(seconds as u64)
    }

    /// 读取节点容器列表，失败时返回写入任务的错误信息
    async fn fetch_listing(&self, node: &Node) -> Result<Vec<Value>, String> {
        let envelope = self
            .node_api
            .call(node, ApiMethod::Get, LISTING_PATH, None)
            .await;
        if !envelope.is_success() {
            return Err(format!("获取容器列表失败: {}", envelope.msg));
        }

        match envelope.data {
            Value::Array(items) => Ok(items),
            _ => Err("容器列表格式错误".to_string()),
        }
    }

    async fn purge_unseen(&self, node: &Node, listing: &[Value]) {
        match self
            .upserter
            .purge_unseen(node.id, &listing_hostnames(listing))
            .await
        {
            Ok(purged) => self.metrics.record_cache_purged(purged),
            Err(e) => warn!(node_id = node.id, "清理节点 {} 旧容器缓存失败: {}", node.name, e),
        }
    }

    async fn run_incremental(&self, node: &Node, task: &mut SyncTask) -> SyncResult<()> {
        let listing = match self.fetch_listing(node).await {
            Ok(listing) => listing,
            Err(message) => return self.tracker.fail(task, message).await,
        };
        self.tracker.set_total(task, listing.len()).await?;

        let plan = BatchPlan::for_node(
            node,
            self.config.default_batch_size,
            self.config.default_batch_interval_seconds,
        );
        let report = self.fetcher.run(node, &listing, &plan).await;
        self.metrics
            .record_container_fetches(report.success as u64, report.failed as u64);

        self.purge_unseen(node, &listing).await;
        self.tracker
            .complete(
                task,
                SyncCounts {
                    total: report.total,
                    success: report.success,
                    failed: report.failed,
                },
            )
            .await
    }

    async fn run_full_refresh(&self, node: &Node, task: &mut SyncTask) -> SyncResult<()> {
        let refresh = self
            .node_api
            .call(node, ApiMethod::Get, REFRESH_PATH, None)
            .await;
        if refresh.is_success() {
            debug!(node_id = node.id, "节点 {} 缓存刷新成功", node.name);
        } else {
            warn!(
                node_id = node.id,
                "节点 {} 刷新缓存失败: {}，继续尝试获取旧缓存",
                node.name,
                refresh.msg
            );
        }

        let listing = match self.fetch_listing(node).await {
            Ok(listing) => listing,
            Err(message) => {
                self.tracker.fail(task, message).await?;
                let purged = self.upserter.purge_node(node.id).await?;
                self.metrics.record_cache_purged(purged);
                return Ok(());
            }
        };
        self.tracker.set_total(task, listing.len()).await?;

        let mut counts = SyncCounts {
            total: listing.len(),
            ..Default::default()
        };
        for entry in &listing {
            let Some(hostname) = entry_hostname(entry) else {
                counts.failed += 1;
                continue;
            };
            match self.upserter.upsert(node, entry).await {
                Ok(_) => counts.success += 1,
                Err(e) => {
                    warn!(node_id = node.id, hostname, "更新容器缓存失败: {}", e);
                    counts.failed += 1;
                }
            }
        }
        self.metrics
            .record_container_fetches(counts.success as u64, counts.failed as u64);

        self.purge_unseen(node, &listing).await;
        self.tracker.complete(task, counts).await
    }

    /// 出错时把仍在运行的任务记为失败
    async fn finish_with_error(&self, task: &mut SyncTask, err: &SyncError) {
        if task.is_finished() {
            return;
        }
        if let Err(e) = self.tracker.fail(task, err.to_string()).await {
            error!(task_id = task.id, node_id = task.node_id, "记录同步失败出错: {}", e);
        }
    }
}

/// 一次进行中的同步
///
/// 被丢弃时任务仍未结束（同步被取消或失败记录没写进去），就在后台把任务标记为中断。
struct RunningSync {
    tracker: SyncTaskTracker,
    metrics: SyncMetrics,
    task_id: i64,
    finished: bool,
}

impl RunningSync {
    fn new(tracker: SyncTaskTracker, metrics: SyncMetrics, task_id: i64) -> Self {
        metrics.sync_started();
        Self {
            tracker,
            metrics,
            task_id,
            finished: false,
        }
    }
}

impl Drop for RunningSync {
    fn drop(&mut self) {
        self.metrics.sync_ended();
        if self.finished {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(task_id = self.task_id, "同步任务被中断，将在下次启动时标记为失败");
            return;
        };
        let tracker = self.tracker.clone();
        let task_id = self.task_id;
        handle.spawn(async move {
            if let Err(e) = tracker.mark_interrupted(task_id).await {
                error!(task_id, "标记中断的同步任务失败: {}", e);
            }
        });
    }
}

#[async_trait]
impl NodeSyncService for ContainerSyncService {
    async fn sync_node(
        &self,
        node_id: i64,
        mode: SyncMode,
        trigger: SyncTrigger,
    ) -> SyncResult<SyncTask> {
        let Some(_permit) = self.guard.acquire(node_id) else {
            self.metrics.record_sync_rejected();
            return Err(SyncError::SyncInProgress { node_id });
        };

        let Some(node) = self.node_repo.find_by_id(node_id).await? else {
            self.metrics.record_sync_rejected();
            return Err(SyncError::NodeNotFound { id: node_id });
        };

        info!(
            node_id,
            ?mode,
            "开始同步节点 {} [{}]",
            node.name,
            trigger
        );
        let mut task = self.tracker.start(&node).await?;
        let mut running = RunningSync::new(self.tracker.clone(), self.metrics.clone(), task.id);
        let started = Instant::now();

        let outcome = match mode {
            SyncMode::Incremental => self.run_incremental(&node, &mut task).await,
            SyncMode::FullRefresh => self.run_full_refresh(&node, &mut task).await,
        };
        if let Err(e) = &outcome {
            self.finish_with_error(&mut task, e).await;
        }
        running.finished = task.is_finished();
        drop(running);

        let result = outcome.map(|()| task);
        let succeeded = matches!(&result, Ok(task) if task.status == SyncTaskStatus::Completed);
        self.metrics
            .record_sync_finished(succeeded, started.elapsed());
        result
    }

    fn is_syncing(&self, node_id: i64) -> bool {
        self.guard.is_syncing(node_id)
    }
}
