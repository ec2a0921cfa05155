//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    ContainerCache, ContainerCacheUpdate, Node, NodeFilter, NodeInfoCache, NodeStatus, SyncTask,
};
use fleet_sync_core::SyncResult;

/// 节点仓储抽象
#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn create(&self, node: &Node) -> SyncResult<Node>;
    async fn find_by_id(&self, id: i64) -> SyncResult<Option<Node>>;
    async fn list(&self, filter: &NodeFilter) -> SyncResult<Vec<Node>>;
    async fn update_status(
        &self,
        id: i64,
        status: NodeStatus,
        checked_at: DateTime<Utc>,
    ) -> SyncResult<()>;
    /// 在一个事务内删除节点及其容器缓存、节点信息缓存和同步任务
    async fn delete_with_dependents(&self, id: i64) -> SyncResult<bool>;
}

/// 容器缓存仓储抽象
#[async_trait]
pub trait ContainerCacheRepository: Send + Sync {
    /// 按 (node_id, hostname) 插入或合并更新
    async fn upsert(&self, update: &ContainerCacheUpdate) -> SyncResult<ContainerCache>;
    async fn find(&self, node_id: i64, hostname: &str) -> SyncResult<Option<ContainerCache>>;
    async fn find_by_node(&self, node_id: i64) -> SyncResult<Vec<ContainerCache>>;
    /// 事务内批量删除，返回删除行数
    async fn delete_by_ids(&self, ids: &[i64]) -> SyncResult<u64>;
    async fn delete_by_node(&self, node_id: i64) -> SyncResult<u64>;
}

/// 同步任务仓储抽象
#[async_trait]
pub trait SyncTaskRepository: Send + Sync {
    async fn create(&self, task: &SyncTask) -> SyncResult<SyncTask>;
    async fn update(&self, task: &SyncTask) -> SyncResult<SyncTask>;
    async fn find_by_id(&self, id: i64) -> SyncResult<Option<SyncTask>>;
    /// 按创建时间取节点最近一次任务
    async fn find_latest_by_node(&self, node_id: i64) -> SyncResult<Option<SyncTask>>;
    async fn list_recent(&self, limit: i64) -> SyncResult<Vec<SyncTask>>;
    async fn list_by_node(&self, node_id: i64, limit: i64) -> SyncResult<Vec<SyncTask>>;
    /// 把所有未结束的任务标记为失败，返回处理的条数
    async fn fail_unfinished(&self, message: &str, ended_at: DateTime<Utc>) -> SyncResult<u64>;
}

/// 节点系统信息缓存仓储抽象
#[async_trait]
pub trait NodeInfoCacheRepository: Send + Sync {
    async fn upsert(
        &self,
        node_id: i64,
        system_info: &str,
        synced_at: DateTime<Utc>,
    ) -> SyncResult<NodeInfoCache>;
    async fn find_by_node(&self, node_id: i64) -> SyncResult<Option<NodeInfoCache>>;
    async fn delete_by_node(&self, node_id: i64) -> SyncResult<bool>;
}
