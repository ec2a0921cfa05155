//! 节点系统信息缓存

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_sync_core::{config::models::NodeCacheConfig, SyncError, SyncResult};
use fleet_sync_domain::{
    entities::{Node, NodeFilter},
    ports::NodeApi,
    repositories::{NodeInfoCacheRepository, NodeRepository},
};
use fleet_sync_infrastructure::observability::SyncMetrics;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// 一轮刷新的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub total: usize,
    pub cached: usize,
    pub cleared: usize,
}

/// 节点系统信息缓存刷新器
///
/// 探测成功时原样缓存节点返回的 JSON 对象，任何失败都删除该节点的缓存，
/// 没有缓存即表示状态未知。
#[derive(Clone)]
pub struct NodeCacheRefresher {
    node_repo: Arc<dyn NodeRepository>,
    info_repo: Arc<dyn NodeInfoCacheRepository>,
    node_api: Arc<dyn NodeApi>,
    max_concurrent_probes: usize,
    refresh_interval: Duration,
    metrics: SyncMetrics,
}

impl NodeCacheRefresher {
    pub fn new(
        node_repo: Arc<dyn NodeRepository>,
        info_repo: Arc<dyn NodeInfoCacheRepository>,
        node_api: Arc<dyn NodeApi>,
        config: &NodeCacheConfig,
        metrics: SyncMetrics,
    ) -> Self {
        Self {
            node_repo,
            info_repo,
            node_api,
            max_concurrent_probes: config.max_concurrent_probes.max(1),
            refresh_interval: config.refresh_interval(),
            metrics,
        }
    }

    /// 启动时刷新一次，之后按周期刷新，直到收到停止信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "节点信息缓存服务启动，刷新周期 {:?}",
            self.refresh_interval
        );
        let mut interval = tokio::time::interval(self.refresh_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.refresh_all().await {
                        error!("刷新节点信息缓存出错: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("节点信息缓存服务收到停止信号");
                    break;
                }
            }
        }
    }

    /// 并发刷新所有节点
    pub async fn refresh_all(&self) -> SyncResult<RefreshSummary> {
        let nodes = self.node_repo.list(&NodeFilter::default()).await?;
        if nodes.is_empty() {
            return Ok(RefreshSummary::default());
        }

        info!("开始刷新 {} 个节点缓存", nodes.len());
        let total = nodes.len();
        let results: Vec<bool> = stream::iter(nodes)
            .map(|node| async move { self.cache_node_info(&node).await })
            .buffer_unordered(self.max_concurrent_probes)
            .collect()
            .await;

        let cached = results.iter().filter(|ok| **ok).count();
        let summary = RefreshSummary {
            total,
            cached,
            cleared: total - cached,
        };
        info!(
            "节点缓存刷新完成: 成功 {}, 清除 {}",
            summary.cached, summary.cleared
        );
        Ok(summary)
    }

    /// 刷新单个节点，不受并发限制
    pub async fn refresh_node(&self, node_id: i64) -> SyncResult<bool> {
        let node = self
            .node_repo
            .find_by_id(node_id)
            .await?
            .ok_or(SyncError::NodeNotFound { id: node_id })?;
        Ok(self.cache_node_info(&node).await)
    }

    /// 探测节点并更新缓存，返回是否缓存成功
    pub async fn cache_node_info(&self, node: &Node) -> bool {
        let cached = match self.node_api.fetch_system_info(node).await {
            Ok(info) => self.store(node, &info).await,
            Err(e) => {
                warn!(node_id = node.id, "获取节点 {} 系统信息失败: {}", node.name, e);
                self.clear(node).await;
                false
            }
        };

        self.metrics.record_node_probe(cached);
        cached
    }

    async fn store(&self, node: &Node, info: &Value) -> bool {
        let blob = match serde_json::to_string(info) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(node_id = node.id, "节点 {} 系统信息序列化失败: {}", node.name, e);
                self.clear(node).await;
                return false;
            }
        };

        match self.info_repo.upsert(node.id, &blob, Utc::now()).await {
            Ok(_) => {
                debug!(node_id = node.id, "节点 {} 信息已缓存", node.name);
                true
            }
            Err(e) => {
                error!(node_id = node.id, "保存节点 {} 缓存失败: {}", node.name, e);
                false
            }
        }
    }

    async fn clear(&self, node: &Node) {
        if let Err(e) = self.info_repo.delete_by_node(node.id).await {
            error!(node_id = node.id, "清除节点 {} 缓存失败: {}", node.name, e);
        }
    }

    /// 读取缓存的系统信息
    pub async fn get_node_info(&self, node_id: i64) -> SyncResult<Option<Value>> {
        match self.info_repo.find_by_node(node_id).await? {
            Some(cache) => Ok(Some(serde_json::from_str(&cache.system_info)?)),
            None => Ok(None),
        }
    }
}
