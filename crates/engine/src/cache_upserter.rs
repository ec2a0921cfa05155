use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use fleet_sync_core::SyncResult;
use fleet_sync_domain::{
    container_payload::ContainerPayload, entities::Node, repositories::ContainerCacheRepository,
};
use serde_json::Value;
use tracing::{debug, info};

/// 容器缓存写入器
///
/// 负责把节点返回的容器 JSON 合并进缓存，以及清理不再存在的容器。
#[derive(Clone)]
pub struct CacheUpserter {
    container_repo: Arc<dyn ContainerCacheRepository>,
}

impl CacheUpserter {
    pub fn new(container_repo: Arc<dyn ContainerCacheRepository>) -> Self {
        Self { container_repo }
    }

    /// 合并一个容器的数据，返回其主机名
    pub async fn upsert(&self, node: &Node, payload: &Value) -> SyncResult<String> {
        let update = ContainerPayload::from_value(payload)?.into_cache_update(node, Utc::now())?;
        let cache = self.container_repo.upsert(&update).await?;
        debug!(node_id = node.id, hostname = %cache.hostname, "容器缓存已更新");
        Ok(cache.hostname)
    }

    /// 删除本次列表中没有出现的容器缓存，返回删除数量
    pub async fn purge_unseen(&self, node_id: i64, seen: &HashSet<String>) -> SyncResult<u64> {
        let stale: Vec<i64> = self
            .container_repo
            .find_by_node(node_id)
            .await?
            .into_iter()
            .filter(|cache| !seen.contains(&cache.hostname))
            .map(|cache| {
                info!(node_id, hostname = %cache.hostname, "删除不存在的容器缓存");
                cache.id
            })
            .collect();

        self.container_repo.delete_by_ids(&stale).await
    }

    /// 删除节点的全部容器缓存
    pub async fn purge_node(&self, node_id: i64) -> SyncResult<u64> {
        let deleted = self.container_repo.delete_by_node(node_id).await?;
        info!(node_id, deleted, "清理节点全部容器缓存");
        Ok(deleted)
    }
}
