use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// 节点同步互斥
///
/// 同一节点同一时刻最多只有一个同步在执行。临界区只做集合的检查和修改，
/// 不在锁内做任何 I/O。
#[derive(Debug, Default)]
pub struct SyncGuard {
    running: Mutex<HashSet<i64>>,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn running(&self) -> MutexGuard<'_, HashSet<i64>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 尝试占用节点，已被占用时返回 false
    pub fn try_acquire(&self, node_id: i64) -> bool {
        let acquired = self.running().insert(node_id);
        debug!(node_id, acquired, "尝试占用节点同步");
        acquired
    }

    pub fn release(&self, node_id: i64) {
        self.running().remove(&node_id);
        debug!(node_id, "释放节点同步");
    }

    pub fn is_syncing(&self, node_id: i64) -> bool {
        self.running().contains(&node_id)
    }

    /// 当前正在同步的节点，按 id 升序
    pub fn running_nodes(&self) -> Vec<i64> {
        let mut nodes: Vec<i64> = self.running().iter().copied().collect();
        nodes.sort_unstable();
        nodes
    }

    /// 占用节点并返回许可，许可被丢弃时自动释放
    pub fn acquire(self: &Arc<Self>, node_id: i64) -> Option<SyncPermit> {
        self.try_acquire(node_id).then(|| SyncPermit {
            guard: Arc::clone(self),
            node_id,
        })
    }
}

/// 节点同步许可
#[derive(Debug)]
pub struct SyncPermit {
    guard: Arc<SyncGuard>,
    node_id: i64,
}

impl SyncPermit {
    pub fn node_id(&self) -> i64 {
        self.node_id
    }
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        self.guard.release(self.node_id);
    }
}
