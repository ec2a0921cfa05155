use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fleet_sync_core::{SyncError, SyncResult};
use fleet_sync_infrastructure::observability::SyncMetrics;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::container_sync::{NodeSyncService, SyncMode, SyncTrigger};

/// 后台同步请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRequest {
    pub node_id: i64,
    pub mode: SyncMode,
    pub trigger: SyncTrigger,
}

impl SyncRequest {
    pub fn new(node_id: i64, mode: SyncMode, trigger: SyncTrigger) -> Self {
        Self {
            node_id,
            mode,
            trigger,
        }
    }
}

/// 后台同步任务队列
///
/// 有界队列加固定并发的工作池。提交只负责入队，结果通过同步任务记录观察。
/// 同一节点在队列中最多等待一个请求，被工作池取走后才能再次提交。
pub struct SyncTaskQueue {
    sender: mpsc::Sender<SyncRequest>,
    receiver: Mutex<Option<mpsc::Receiver<SyncRequest>>>,
    queued: Mutex<HashSet<i64>>,
    sync_service: Arc<dyn NodeSyncService>,
    max_concurrent: usize,
    metrics: SyncMetrics,
}

impl SyncTaskQueue {
    pub fn new(
        sync_service: Arc<dyn NodeSyncService>,
        capacity: usize,
        max_concurrent: usize,
        metrics: SyncMetrics,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            queued: Mutex::new(HashSet::new()),
            sync_service,
            max_concurrent: max_concurrent.max(1),
            metrics,
        }
    }

    fn queued(&self) -> MutexGuard<'_, HashSet<i64>> {
        self.queued.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 节点是否有请求在队列中等待
    pub fn is_queued(&self, node_id: i64) -> bool {
        self.queued().contains(&node_id)
    }

    /// 提交同步请求
    ///
    /// 节点已有请求在等待时返回 `SyncQueued`，队列已满或已关闭时返回错误。
    pub fn submit(&self, request: SyncRequest) -> SyncResult<()> {
        if !self.queued().insert(request.node_id) {
            debug!(node_id = request.node_id, "节点已在同步队列中");
            return Err(SyncError::SyncQueued {
                node_id: request.node_id,
            });
        }

        self.sender.try_send(request).map_err(|e| {
            self.queued().remove(&request.node_id);
            match e {
                mpsc::error::TrySendError::Full(r) => {
                    warn!(node_id = r.node_id, "同步队列已满，丢弃请求");
                    SyncError::Internal(format!("同步队列已满，节点 {} 的请求被丢弃", r.node_id))
                }
                mpsc::error::TrySendError::Closed(r) => SyncError::Internal(format!(
                    "同步队列已关闭，节点 {} 的请求被丢弃",
                    r.node_id
                )),
            }
        })?;

        debug!(
            node_id = request.node_id,
            mode = ?request.mode,
            "同步请求已入队"
        );
        self.metrics.update_queue_depth(self.pending());
        Ok(())
    }

    /// 队列中等待执行的请求数
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// 运行工作池直到收到停止信号
    ///
    /// 停止时不再取新请求，已经开始的同步会执行完。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> SyncResult<()> {
        let mut receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| SyncError::Internal("同步队列已在运行".to_string()))?;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        info!("同步任务队列启动，最大并发 {}", self.max_concurrent);

        loop {
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown_rx.recv() => {
                    info!("同步任务队列收到停止信号");
                    break;
                }
            };

            let request = tokio::select! {
                request = receiver.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
                _ = shutdown_rx.recv() => {
                    info!("同步任务队列收到停止信号");
                    break;
                }
            };
            self.queued().remove(&request.node_id);
            self.metrics.update_queue_depth(self.pending());

            let service = Arc::clone(&self.sync_service);
            tokio::spawn(async move {
                let _permit = permit;
                match service
                    .sync_node(request.node_id, request.mode, request.trigger)
                    .await
                {
                    Ok(task) => debug!(
                        node_id = request.node_id,
                        task_id = task.id,
                        "后台同步结束: {}",
                        task.status
                    ),
                    Err(e) if e.is_rejection() => {
                        info!(node_id = request.node_id, "跳过后台同步: {}", e)
                    }
                    Err(e) => error!(node_id = request.node_id, "后台同步出错: {}", e),
                }
            });
        }

        receiver.close();
        // 等待进行中的同步结束
        let _ = semaphore.acquire_many(self.max_concurrent as u32).await;
        info!("同步任务队列已停止");
        Ok(())
    }
}
