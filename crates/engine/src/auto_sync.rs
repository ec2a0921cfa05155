use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use fleet_sync_core::SyncResult;
use fleet_sync_domain::{entities::NodeFilter, repositories::NodeRepository};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use crate::container_sync::{NodeSyncService, SyncMode, SyncTrigger};
use crate::task_queue::{SyncRequest, SyncTaskQueue};
use crate::task_tracker::SyncTaskTracker;

struct AutoSyncLoop {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// 自动同步调度器
///
/// 周期性检查开启了自动同步的活动节点，到期的节点提交到后台队列。
/// 开启、关闭和查询共用一把锁。
#[derive(Clone)]
pub struct AutoSyncScheduler {
    node_repo: Arc<dyn NodeRepository>,
    tracker: SyncTaskTracker,
    sync_service: Arc<dyn NodeSyncService>,
    queue: Arc<SyncTaskQueue>,
    tick_interval: Duration,
    state: Arc<Mutex<Option<AutoSyncLoop>>>,
}

impl AutoSyncScheduler {
    pub fn new(
        node_repo: Arc<dyn NodeRepository>,
        tracker: SyncTaskTracker,
        sync_service: Arc<dyn NodeSyncService>,
        queue: Arc<SyncTaskQueue>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            node_repo,
            tracker,
            sync_service,
            queue,
            tick_interval,
            state: Arc::new(Mutex::new(None)),
        }
    }

    fn state(&self) -> MutexGuard<'_, Option<AutoSyncLoop>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 开启自动同步，已开启时不做任何事并返回 false
    pub fn enable(&self) -> bool {
        let mut state = self.state();
        if state
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            debug!("自动同步已在运行");
            return false;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let scheduler = self.clone();
        let handle = tokio::spawn(async move { scheduler.run_loop(stop_rx).await });
        *state = Some(AutoSyncLoop { stop_tx, handle });

        info!("自动同步已开启，检查周期 {:?}", self.tick_interval);
        true
    }

    /// 关闭自动同步，未开启时不做任何事并返回 false
    pub fn disable(&self) -> bool {
        let Some(running) = self.state().take() else {
            debug!("自动同步未开启");
            return false;
        };

        let _ = running.stop_tx.send(());
        info!("自动同步已关闭");
        true
    }

    pub fn is_enabled(&self) -> bool {
        self.state()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    async fn run_loop(&self, mut stop_rx: oneshot::Receiver<()>) {
        let mut interval = interval_at(Instant::now() + self.tick_interval, self.tick_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.check_and_sync().await {
                        error!("自动同步检查出错: {}", e);
                    }
                }
                _ = &mut stop_rx => {
                    info!("自动同步循环收到停止信号");
                    break;
                }
            }
        }
    }

    /// 检查一轮，返回提交了同步的节点
    pub async fn check_and_sync(&self) -> SyncResult<Vec<i64>> {
        let nodes = self
            .node_repo
            .list(&NodeFilter::auto_sync_candidates())
            .await?;
        let now = Utc::now();

        let mut submitted = Vec::new();
        for node in nodes {
            if self.sync_service.is_syncing(node.id) {
                debug!(node_id = node.id, "节点 {} 正在同步，跳过", node.name);
                continue;
            }

            if self.queue.is_queued(node.id) {
                debug!(node_id = node.id, "节点 {} 已在同步队列中，跳过", node.name);
                continue;
            }

            let last = match self.tracker.last_task(node.id).await {
                Ok(last) => last,
                Err(e) => {
                    warn!(node_id = node.id, "读取节点 {} 最近同步任务失败: {}", node.name, e);
                    continue;
                }
            };
            if !self.tracker.should_sync(&node, last.as_ref(), now) {
                continue;
            }

            let request = SyncRequest::new(node.id, SyncMode::Incremental, SyncTrigger::Auto);
            match self.queue.submit(request) {
                Ok(()) => submitted.push(node.id),
                Err(e) => warn!(node_id = node.id, "提交自动同步失败: {}", e),
            }
        }

        if !submitted.is_empty() {
            info!("自动同步提交了 {} 个节点", submitted.len());
        }
        Ok(submitted)
    }
}
