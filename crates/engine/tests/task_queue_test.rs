use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleet_sync_core::{SyncError, SyncResult};
use fleet_sync_domain::entities::{SyncTask, SyncTaskStatus};
use fleet_sync_engine::{NodeSyncService, SyncMode, SyncRequest, SyncTaskQueue, SyncTrigger};
use fleet_sync_infrastructure::observability::SyncMetrics;
use fleet_sync_testing_utils::builders::NodeBuilder;
use tokio::sync::broadcast;

/// 记录调用和并发数的同步服务
#[derive(Default)]
struct RecordingSync {
    delay: Duration,
    reject: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    finished: Mutex<Vec<(i64, SyncMode)>>,
}

impl RecordingSync {
    fn finished(&self) -> Vec<(i64, SyncMode)> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeSyncService for RecordingSync {
    async fn sync_node(
        &self,
        node_id: i64,
        mode: SyncMode,
        _trigger: SyncTrigger,
    ) -> SyncResult<SyncTask> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push((node_id, mode));

        if self.reject {
            return Err(SyncError::SyncInProgress { node_id });
        }
        let mut task = SyncTask::pending(&NodeBuilder::new().with_id(node_id).build());
        task.status = SyncTaskStatus::Completed;
        Ok(task)
    }

    fn is_syncing(&self, _node_id: i64) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

async fn wait_for(sync: &RecordingSync, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while sync.finished().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("同步请求未在预期时间内完成");
}

#[tokio::test]
async fn test_worker_pool_bounds_concurrency() {
    let sync = Arc::new(RecordingSync {
        delay: Duration::from_millis(50),
        ..Default::default()
    });
    let queue = Arc::new(SyncTaskQueue::new(sync.clone(), 16, 2, SyncMetrics::new()));
    for node_id in 1..=6 {
        queue
            .submit(SyncRequest::new(node_id, SyncMode::Incremental, SyncTrigger::Auto))
            .unwrap();
    }
    assert_eq!(queue.pending(), 6);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let runner = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.run(shutdown_rx).await })
    };

    wait_for(&sync, 6).await;
    assert_eq!(sync.max_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(queue.pending(), 0);

    shutdown_tx.send(()).unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_submit_fails_when_queue_is_full() {
    let sync = Arc::new(RecordingSync::default());
    let queue = SyncTaskQueue::new(sync, 1, 1, SyncMetrics::new());

    queue
        .submit(SyncRequest::new(1, SyncMode::Incremental, SyncTrigger::Manual))
        .unwrap();
    let err = queue
        .submit(SyncRequest::new(2, SyncMode::FullRefresh, SyncTrigger::Manual))
        .unwrap_err();

    assert!(matches!(err, SyncError::Internal(_)));
    assert_eq!(queue.pending(), 1);
}

#[tokio::test]
async fn test_rejected_sync_does_not_stop_the_pool() {
    let sync = Arc::new(RecordingSync {
        reject: true,
        ..Default::default()
    });
    let queue = Arc::new(SyncTaskQueue::new(sync.clone(), 8, 4, SyncMetrics::new()));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let runner = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.run(shutdown_rx).await })
    };

    queue
        .submit(SyncRequest::new(1, SyncMode::Incremental, SyncTrigger::Auto))
        .unwrap();
    queue
        .submit(SyncRequest::new(2, SyncMode::FullRefresh, SyncTrigger::Manual))
        .unwrap();

    wait_for(&sync, 2).await;
    let finished = sync.finished();
    assert!(finished.contains(&(1, SyncMode::Incremental)));
    assert!(finished.contains(&(2, SyncMode::FullRefresh)));

    shutdown_tx.send(()).unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_queue_runs_only_once() {
    let sync = Arc::new(RecordingSync::default());
    let queue = Arc::new(SyncTaskQueue::new(sync, 4, 1, SyncMetrics::new()));
    let (shutdown_tx, first_rx) = broadcast::channel(1);
    let second_rx = shutdown_tx.subscribe();

    let runner = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.run(first_rx).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = queue.run(second_rx).await.unwrap_err();
    assert!(matches!(err, SyncError::Internal(_)));

    shutdown_tx.send(()).unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_node_waits_in_queue_at_most_once() {
    let sync = Arc::new(RecordingSync {
        delay: Duration::from_millis(50),
        ..Default::default()
    });
    let queue = Arc::new(SyncTaskQueue::new(sync.clone(), 8, 1, SyncMetrics::new()));

    queue
        .submit(SyncRequest::new(1, SyncMode::Incremental, SyncTrigger::Auto))
        .unwrap();
    let err = queue
        .submit(SyncRequest::new(1, SyncMode::FullRefresh, SyncTrigger::Manual))
        .unwrap_err();
    assert!(matches!(err, SyncError::SyncQueued { node_id: 1 }));
    assert!(err.is_rejection());
    queue
        .submit(SyncRequest::new(2, SyncMode::Incremental, SyncTrigger::Auto))
        .unwrap();
    assert!(queue.is_queued(1));
    assert_eq!(queue.pending(), 2);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let runner = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.run(shutdown_rx).await })
    };
    wait_for(&sync, 2).await;
    assert!(!queue.is_queued(1));

    // 被取走之后可以再次提交
    queue
        .submit(SyncRequest::new(1, SyncMode::FullRefresh, SyncTrigger::Manual))
        .unwrap();
    wait_for(&sync, 3).await;
    assert_eq!(
        sync.finished(),
        vec![
            (1, SyncMode::Incremental),
            (2, SyncMode::Incremental),
            (1, SyncMode::FullRefresh)
        ]
    );

    shutdown_tx.send(()).unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_full_queue_does_not_mark_node_queued() {
    let sync = Arc::new(RecordingSync::default());
    let queue = SyncTaskQueue::new(sync, 1, 1, SyncMetrics::new());

    queue
        .submit(SyncRequest::new(1, SyncMode::Incremental, SyncTrigger::Manual))
        .unwrap();
    queue
        .submit(SyncRequest::new(2, SyncMode::Incremental, SyncTrigger::Manual))
        .unwrap_err();

    assert!(queue.is_queued(1));
    assert!(!queue.is_queued(2));
}
