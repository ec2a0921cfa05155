//! Mock implementations for all repository and node API traits
//!
//! In-memory mocks that can be used for unit testing without requiring
//! actual database connections or reachable node agents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_sync_core::{SyncError, SyncResult};
use fleet_sync_domain::entities::{
    ContainerCache, ContainerCacheUpdate, Node, NodeFilter, NodeInfoCache, NodeStatus, SyncTask,
    SyncTaskStatus,
};
use fleet_sync_domain::ports::{ApiEnvelope, ApiMethod, NodeApi};
use fleet_sync_domain::repositories::{
    ContainerCacheRepository, NodeInfoCacheRepository, NodeRepository, SyncTaskRepository,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::builders::{container_detail, container_listing_entry, info_path};

/// Mock implementation of NodeRepository for testing
#[derive(Debug, Clone)]
pub struct MockNodeRepository {
    nodes: Arc<Mutex<HashMap<i64, Node>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockNodeRepository {
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Nodes keep their ids
    pub fn with_nodes(nodes: Vec<Node>) -> Self {
        let max_id = nodes.iter().map(|n| n.id).max().unwrap_or(0);
        let node_map = nodes.into_iter().map(|n| (n.id, n)).collect();

        Self {
            nodes: Arc::new(Mutex::new(node_map)),
            next_id: Arc::new(Mutex::new(max_id + 1)),
        }
    }

    pub fn get(&self, id: i64) -> Option<Node> {
        self.nodes.lock().unwrap().get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.nodes.lock().unwrap().len()
    }
}

impl Default for MockNodeRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRepository for MockNodeRepository {
    async fn create(&self, node: &Node) -> SyncResult<Node> {
        let mut nodes = self.nodes.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut new_node = node.clone();
        new_node.id = *next_id;
        *next_id += 1;

        nodes.insert(new_node.id, new_node.clone());
        Ok(new_node)
    }

    async fn find_by_id(&self, id: i64) -> SyncResult<Option<Node>> {
        Ok(self.nodes.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self, filter: &NodeFilter) -> SyncResult<Vec<Node>> {
        let nodes = self.nodes.lock().unwrap();
        let mut matched: Vec<Node> = nodes.values().filter(|n| filter.matches(n)).cloned().collect();
        matched.sort_by_key(|n| n.id);
        Ok(matched)
    }

    async fn update_status(
        &self,
        id: i64,
        status: NodeStatus,
        checked_at: DateTime<Utc>,
    ) -> SyncResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes.get_mut(&id).ok_or(SyncError::NodeNotFound { id })?;
        node.status = status;
        node.last_check = Some(checked_at);
        node.updated_at = checked_at;
        Ok(())
    }

    async fn delete_with_dependents(&self, id: i64) -> SyncResult<bool> {
        Ok(self.nodes.lock().unwrap().remove(&id).is_some())
    }
}

/// Mock implementation of ContainerCacheRepository for testing
#[derive(Debug, Clone)]
pub struct MockContainerCacheRepository {
    rows: Arc<Mutex<HashMap<(i64, String), ContainerCache>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockContainerCacheRepository {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Sorted hostnames cached for a node
    pub fn hostnames(&self, node_id: i64) -> Vec<String> {
        let rows = self.rows.lock().unwrap();
        let mut hostnames: Vec<String> = rows
            .keys()
            .filter(|(id, _)| *id == node_id)
            .map(|(_, hostname)| hostname.clone())
            .collect();
        hostnames.sort();
        hostnames
    }

    pub fn get(&self, node_id: i64, hostname: &str) -> Option<ContainerCache> {
        self.rows
            .lock()
            .unwrap()
            .get(&(node_id, hostname.to_string()))
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

impl Default for MockContainerCacheRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerCacheRepository for MockContainerCacheRepository {
    async fn upsert(&self, update: &ContainerCacheUpdate) -> SyncResult<ContainerCache> {
        let mut rows = self.rows.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let key = (update.node_id, update.hostname.clone());
        let merged = update.apply_to(rows.get(&key), *next_id);
        if merged.id == *next_id {
            *next_id += 1;
        }
        rows.insert(key, merged.clone());
        Ok(merged)
    }

    async fn find(&self, node_id: i64, hostname: &str) -> SyncResult<Option<ContainerCache>> {
        Ok(self.get(node_id, hostname))
    }

    async fn find_by_node(&self, node_id: i64) -> SyncResult<Vec<ContainerCache>> {
        let rows = self.rows.lock().unwrap();
        let mut found: Vec<ContainerCache> = rows
            .values()
            .filter(|c| c.node_id == node_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(found)
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> SyncResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, c| !ids.contains(&c.id));
        Ok((before - rows.len()) as u64)
    }

    async fn delete_by_node(&self, node_id: i64) -> SyncResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(id, _), _| *id != node_id);
        Ok((before - rows.len()) as u64)
    }
}

/// Mock implementation of SyncTaskRepository for testing
#[derive(Debug, Clone)]
pub struct MockSyncTaskRepository {
    tasks: Arc<Mutex<HashMap<i64, SyncTask>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockSyncTaskRepository {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn with_tasks(tasks: Vec<SyncTask>) -> Self {
        let max_id = tasks.iter().map(|t| t.id).max().unwrap_or(0);
        let task_map = tasks.into_iter().map(|t| (t.id, t)).collect();

        Self {
            tasks: Arc::new(Mutex::new(task_map)),
            next_id: Arc::new(Mutex::new(max_id + 1)),
        }
    }

    /// All tasks ordered by id
    pub fn all(&self) -> Vec<SyncTask> {
        let mut tasks: Vec<SyncTask> = self.tasks.lock().unwrap().values().cloned().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    fn newest_first(tasks: &HashMap<i64, SyncTask>) -> Vec<SyncTask> {
        let mut sorted: Vec<SyncTask> = tasks.values().cloned().collect();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        sorted
    }
}

impl Default for MockSyncTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncTaskRepository for MockSyncTaskRepository {
    async fn create(&self, task: &SyncTask) -> SyncResult<SyncTask> {
        let mut tasks = self.tasks.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut new_task = task.clone();
        new_task.id = *next_id;
        *next_id += 1;

        tasks.insert(new_task.id, new_task.clone());
        Ok(new_task)
    }

    async fn update(&self, task: &SyncTask) -> SyncResult<SyncTask> {
        let mut tasks = self.tasks.lock().unwrap();
        let stored = tasks
            .get_mut(&task.id)
            .ok_or(SyncError::SyncTaskNotFound { id: task.id })?;
        if stored.is_finished() {
            return Err(SyncError::DatabaseOperation(format!(
                "同步任务 {} 已结束，不能再更新",
                task.id
            )));
        }

        *stored = task.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn find_by_id(&self, id: i64) -> SyncResult<Option<SyncTask>> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn find_latest_by_node(&self, node_id: i64) -> SyncResult<Option<SyncTask>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(Self::newest_first(&tasks)
            .into_iter()
            .find(|t| t.node_id == node_id))
    }

    async fn list_recent(&self, limit: i64) -> SyncResult<Vec<SyncTask>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(Self::newest_first(&tasks)
            .into_iter()
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_by_node(&self, node_id: i64, limit: i64) -> SyncResult<Vec<SyncTask>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(Self::newest_first(&tasks)
            .into_iter()
            .filter(|t| t.node_id == node_id)
            .take(limit.max(0) as usize)
            .collect())
    }
    async fn fail_unfinished(&self, message: &str, ended_at: DateTime<Utc>) -> SyncResult<u64> {
        let mut tasks = self.tasks.lock().unwrap();
        let mut affected = 0;
        for task in tasks.values_mut().filter(|t| !t.is_finished()) {
            task.status = SyncTaskStatus::Failed;
            task.error_message = message.to_string();
            task.end_time = Some(ended_at);
            task.updated_at = ended_at;
            affected += 1;
        }
        Ok(affected)
    }
}

/// Mock implementation of NodeInfoCacheRepository for testing
#[derive(Debug, Clone)]
pub struct MockNodeInfoCacheRepository {
    rows: Arc<Mutex<HashMap<i64, NodeInfoCache>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockNodeInfoCacheRepository {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn get(&self, node_id: i64) -> Option<NodeInfoCache> {
        self.rows.lock().unwrap().get(&node_id).cloned()
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

impl Default for MockNodeInfoCacheRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeInfoCacheRepository for MockNodeInfoCacheRepository {
    async fn upsert(
        &self,
        node_id: i64,
        system_info: &str,
        synced_at: DateTime<Utc>,
    ) -> SyncResult<NodeInfoCache> {
        let mut rows = self.rows.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let entry = rows.entry(node_id).or_insert_with(|| {
            let id = *next_id;
            *next_id += 1;
            NodeInfoCache {
                id,
                node_id,
                system_info: String::new(),
                last_sync: synced_at,
                created_at: synced_at,
                updated_at: synced_at,
            }
        });
        entry.system_info = system_info.to_string();
        entry.last_sync = synced_at;
        entry.updated_at = synced_at;
        Ok(entry.clone())
    }

    async fn find_by_node(&self, node_id: i64) -> SyncResult<Option<NodeInfoCache>> {
        Ok(self.get(node_id))
    }

    async fn delete_by_node(&self, node_id: i64) -> SyncResult<bool> {
        Ok(self.rows.lock().unwrap().remove(&node_id).is_some())
    }
}

#[derive(Debug, Default)]
struct MockNodeApiState {
    responses: HashMap<(i64, String), ApiEnvelope>,
    system_info: HashMap<i64, Value>,
    healthy: HashSet<i64>,
    calls: Vec<(i64, String)>,
    delay: Duration,
}

/// Scripted node agent
///
/// Unscripted calls return a failure envelope. Every call is recorded and
/// the peak number of concurrent calls is tracked.
#[derive(Debug, Clone, Default)]
pub struct MockNodeApi {
    state: Arc<Mutex<MockNodeApiState>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockNodeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_response(&self, node_id: i64, path: &str, envelope: ApiEnvelope) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert((node_id, path.to_string()), envelope);
    }

    pub fn with_response(self, node_id: i64, path: &str, envelope: ApiEnvelope) -> Self {
        self.set_response(node_id, path, envelope);
        self
    }

    /// Script a healthy node hosting the given containers: listing, refresh
    /// and per-container detail endpoints all succeed.
    pub fn set_containers(&self, node_id: i64, hostnames: &[&str]) {
        let listing: Vec<Value> = hostnames
            .iter()
            .map(|h| container_listing_entry(h))
            .collect();
        self.set_response(
            node_id,
            "/api/cache/containers",
            ApiEnvelope::success(Value::Array(listing)),
        );
        self.set_response(
            node_id,
            "/api/cache/containers/refresh",
            ApiEnvelope::success(json!(null)),
        );
        for hostname in hostnames {
            self.set_response(
                node_id,
                &info_path(hostname),
                ApiEnvelope::success(container_detail(hostname)),
            );
        }
    }

    pub fn with_containers(self, node_id: i64, hostnames: &[&str]) -> Self {
        self.set_containers(node_id, hostnames);
        self
    }

    pub fn set_system_info(&self, node_id: i64, info: Value) {
        self.state.lock().unwrap().system_info.insert(node_id, info);
    }

    pub fn clear_system_info(&self, node_id: i64) {
        self.state.lock().unwrap().system_info.remove(&node_id);
    }

    pub fn with_system_info(self, node_id: i64, info: Value) -> Self {
        self.set_system_info(node_id, info);
        self
    }

    pub fn with_healthy(self, node_id: i64) -> Self {
        self.state.lock().unwrap().healthy.insert(node_id);
        self
    }

    /// Delay applied to every call
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(i64, String)> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls whose path starts with the given prefix
    pub fn call_count(&self, path_prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(_, path)| path.starts_with(path_prefix))
            .count()
    }

    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, node_id: i64, path: &str) {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.calls.push((node_id, path.to_string()));
            state.delay
        };

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeApi for MockNodeApi {
    async fn call(
        &self,
        node: &Node,
        _method: ApiMethod,
        path: &str,
        _body: Option<&Value>,
    ) -> ApiEnvelope {
        self.enter(node.id, path).await;

        self.state
            .lock()
            .unwrap()
            .responses
            .get(&(node.id, path.to_string()))
            .cloned()
            .unwrap_or_else(|| ApiEnvelope::failure(format!("请求失败: 未配置的路径 {path}")))
    }

    async fn fetch_system_info(&self, node: &Node) -> SyncResult<Value> {
        self.enter(node.id, "/").await;

        self.state
            .lock()
            .unwrap()
            .system_info
            .get(&node.id)
            .cloned()
            .ok_or_else(|| SyncError::NodeApi(format!("节点 {} 连接失败", node.name)))
    }

    async fn check_health(&self, node: &Node) -> SyncResult<()> {
        self.enter(node.id, "/api/check").await;

        if self.state.lock().unwrap().healthy.contains(&node.id) {
            Ok(())
        } else {
            Err(SyncError::NodeApi(format!(
                "节点 {} 连通性检查失败",
                node.name
            )))
        }
    }
}
