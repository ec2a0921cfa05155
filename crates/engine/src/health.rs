use std::sync::Arc;

use chrono::Utc;
use fleet_sync_core::{SyncError, SyncResult};
use fleet_sync_domain::{entities::NodeStatus, ports::NodeApi, repositories::NodeRepository};
use tracing::{info, warn};

use crate::node_cache::NodeCacheRefresher;

/// 节点连通性检查
///
/// 检查结果写回节点状态；检查通过时顺带刷新节点信息缓存。
#[derive(Clone)]
pub struct NodeHealthChecker {
    node_repo: Arc<dyn NodeRepository>,
    node_api: Arc<dyn NodeApi>,
    cache_refresher: NodeCacheRefresher,
}

impl NodeHealthChecker {
    pub fn new(
        node_repo: Arc<dyn NodeRepository>,
        node_api: Arc<dyn NodeApi>,
        cache_refresher: NodeCacheRefresher,
    ) -> Self {
        Self {
            node_repo,
            node_api,
            cache_refresher,
        }
    }

    /// 检查节点连通性，返回检查后的状态
    pub async fn check_node(&self, node_id: i64) -> SyncResult<NodeStatus> {
        let node = self
            .node_repo
            .find_by_id(node_id)
            .await?
            .ok_or(SyncError::NodeNotFound { id: node_id })?;

        let status = match self.node_api.check_health(&node).await {
            Ok(()) => {
                info!(node_id, "节点 {} 连接正常", node.name);
                NodeStatus::Active
            }
            Err(e) => {
                warn!(node_id, "节点 {} 连接失败: {}", node.name, e);
                NodeStatus::Error
            }
        };

        self.node_repo
            .update_status(node_id, status, Utc::now())
            .await?;

        if status == NodeStatus::Active {
            self.cache_refresher.cache_node_info(&node).await;
        }
        Ok(status)
    }
}
