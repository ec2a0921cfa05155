use std::sync::Arc;

use fleet_sync_core::{
    config::models::{NodeCacheConfig, SyncConfig},
    SyncError, SyncResult,
};
use fleet_sync_domain::{
    entities::{NodeFilter, NodeStatus, NodeSyncStatus, SyncTask},
    ports::NodeApi,
    repositories::{
        ContainerCacheRepository, NodeInfoCacheRepository, NodeRepository, SyncTaskRepository,
    },
};
use fleet_sync_infrastructure::observability::SyncMetrics;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::auto_sync::AutoSyncScheduler;
use crate::container_sync::{ContainerSyncService, NodeSyncService, SyncMode, SyncTrigger};
use crate::health::NodeHealthChecker;
use crate::node_cache::NodeCacheRefresher;
use crate::sync_guard::SyncGuard;
use crate::task_queue::{SyncRequest, SyncTaskQueue};

/// 引擎依赖的仓储和节点接口
#[derive(Clone)]
pub struct EngineDependencies {
    pub node_repo: Arc<dyn NodeRepository>,
    pub container_repo: Arc<dyn ContainerCacheRepository>,
    pub task_repo: Arc<dyn SyncTaskRepository>,
    pub info_repo: Arc<dyn NodeInfoCacheRepository>,
    pub node_api: Arc<dyn NodeApi>,
}

/// 同步引擎
///
/// 对外的统一入口，组装同步服务、后台队列、自动同步、节点信息缓存和连通性检查。
pub struct SyncEngine {
    node_repo: Arc<dyn NodeRepository>,
    guard: Arc<SyncGuard>,
    sync_service: Arc<ContainerSyncService>,
    queue: Arc<SyncTaskQueue>,
    auto_sync: AutoSyncScheduler,
    node_cache: NodeCacheRefresher,
    health: NodeHealthChecker,
    task_history_limit: i64,
}

impl SyncEngine {
    pub fn new(
        deps: EngineDependencies,
        sync_config: SyncConfig,
        cache_config: &NodeCacheConfig,
        metrics: SyncMetrics,
    ) -> Self {
        let guard = Arc::new(SyncGuard::new());
        let sync_service = Arc::new(ContainerSyncService::new(
            Arc::clone(&deps.node_repo),
            deps.container_repo,
            deps.task_repo,
            Arc::clone(&deps.node_api),
            Arc::clone(&guard),
            sync_config.clone(),
            metrics.clone(),
        ));

        let queue = Arc::new(SyncTaskQueue::new(
            sync_service.clone(),
            sync_config.queue_capacity,
            sync_config.max_concurrent_syncs,
            metrics.clone(),
        ));

        let auto_sync = AutoSyncScheduler::new(
            Arc::clone(&deps.node_repo),
            sync_service.tracker().clone(),
            sync_service.clone(),
            Arc::clone(&queue),
            sync_config.tick_interval(),
        );

        let node_cache = NodeCacheRefresher::new(
            Arc::clone(&deps.node_repo),
            deps.info_repo,
            Arc::clone(&deps.node_api),
            cache_config,
            metrics,
        );

        let health = NodeHealthChecker::new(
            Arc::clone(&deps.node_repo),
            deps.node_api,
            node_cache.clone(),
        );

        Self {
            node_repo: deps.node_repo,
            guard,
            sync_service,
            queue,
            auto_sync,
            node_cache,
            health,
            task_history_limit: sync_config.task_history_limit,
        }
    }

    /// 把上次进程遗留的未结束任务标记为失败，需在后台组件启动前调用
    pub async fn recover_unfinished_tasks(&self) -> SyncResult<u64> {
        self.sync_service.tracker().fail_unfinished().await
    }

    /// 运行后台同步队列，直到收到停止信号
    pub async fn run_queue(&self, shutdown_rx: broadcast::Receiver<()>) -> SyncResult<()> {
        self.queue.run(shutdown_rx).await
    }

    /// 运行节点信息缓存刷新，直到收到停止信号
    pub async fn run_node_cache(&self, shutdown_rx: broadcast::Receiver<()>) {
        self.node_cache.run(shutdown_rx).await
    }

    /// 立即同步一个节点并等待完成
    pub async fn sync_node(&self, node_id: i64, mode: SyncMode) -> SyncResult<SyncTask> {
        self.sync_service
            .sync_node(node_id, mode, SyncTrigger::Manual)
            .await
    }

    /// 提交一个后台同步
    ///
    /// 节点不存在或正在同步时立即返回错误，其余结果通过同步任务记录查看。
    pub async fn submit_sync(&self, node_id: i64, mode: SyncMode) -> SyncResult<()> {
        if self.node_repo.find_by_id(node_id).await?.is_none() {
            return Err(SyncError::NodeNotFound { id: node_id });
        }
        if self.sync_service.is_syncing(node_id) {
            return Err(SyncError::SyncInProgress { node_id });
        }

        self.queue
            .submit(SyncRequest::new(node_id, mode, SyncTrigger::Manual))
    }

    /// 为所有活动节点提交后台同步，返回已提交的节点
    pub async fn submit_all(&self, mode: SyncMode) -> SyncResult<Vec<i64>> {
        let nodes = self.node_repo.list(&NodeFilter::active()).await?;

        let mut submitted = Vec::with_capacity(nodes.len());
        for node in nodes {
            if self.sync_service.is_syncing(node.id) || self.queue.is_queued(node.id) {
                continue;
            }
            match self
                .queue
                .submit(SyncRequest::new(node.id, mode, SyncTrigger::Manual))
            {
                Ok(()) => submitted.push(node.id),
                Err(e) => warn!(node_id = node.id, "提交节点 {} 同步失败: {}", node.name, e),
            }
        }

        info!("已为 {} 个活动节点提交同步", submitted.len());
        Ok(submitted)
    }

    /// 依次同步所有活动节点并等待完成
    pub async fn sync_all_nodes(&self) -> SyncResult<Vec<SyncTask>> {
        self.sync_service.sync_all_nodes().await
    }

    /// 同步刷新节点信息缓存，并提交一次完整刷新的容器同步
    pub async fn refresh_node_all(&self, node_id: i64) -> SyncResult<bool> {
        let cached = self.node_cache.refresh_node(node_id).await?;
        self.submit_sync(node_id, SyncMode::FullRefresh).await?;
        Ok(cached)
    }

    pub fn is_syncing(&self, node_id: i64) -> bool {
        self.sync_service.is_syncing(node_id)
    }

    /// 最近的同步任务，未指定条数时使用配置的默认值
    pub async fn recent_tasks(&self, limit: Option<i64>) -> SyncResult<Vec<SyncTask>> {
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(self.task_history_limit);
        self.sync_service.tracker().recent(limit).await
    }

    pub async fn node_tasks(&self, node_id: i64, limit: Option<i64>) -> SyncResult<Vec<SyncTask>> {
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(self.task_history_limit);
        self.sync_service.tracker().by_node(node_id, limit).await
    }

    pub async fn node_sync_status(&self) -> SyncResult<Vec<NodeSyncStatus>> {
        self.sync_service.node_sync_status().await
    }

    pub async fn check_node(&self, node_id: i64) -> SyncResult<NodeStatus> {
        self.health.check_node(node_id).await
    }

    pub async fn refresh_node_info(&self, node_id: i64) -> SyncResult<bool> {
        self.node_cache.refresh_node(node_id).await
    }

    pub async fn get_node_info(&self, node_id: i64) -> SyncResult<Option<Value>> {
        self.node_cache.get_node_info(node_id).await
    }

    /// 删除节点及其缓存和同步记录，同步进行中时拒绝
    ///
    /// 删除期间占用节点，新的同步会被拒绝。
    pub async fn delete_node(&self, node_id: i64) -> SyncResult<bool> {
        let Some(_permit) = self.guard.acquire(node_id) else {
            return Err(SyncError::SyncInProgress { node_id });
        };

        let deleted = self.node_repo.delete_with_dependents(node_id).await?;
        if deleted {
            info!(node_id, "节点已删除");
        }
        Ok(deleted)
    }

    pub fn enable_auto_sync(&self) -> bool {
        self.auto_sync.enable()
    }

    pub fn disable_auto_sync(&self) -> bool {
        self.auto_sync.disable()
    }

    pub fn is_auto_sync_enabled(&self) -> bool {
        self.auto_sync.is_enabled()
    }
}
