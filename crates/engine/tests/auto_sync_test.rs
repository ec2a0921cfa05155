use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_sync_core::{config::models::SyncConfig, SyncError, SyncResult};
use fleet_sync_domain::{
    entities::{Node, NodeStatus, SyncTask, SyncTaskStatus},
    repositories::SyncTaskRepository,
};
use fleet_sync_engine::{
    AutoSyncScheduler, ContainerSyncService, SyncGuard, SyncTaskQueue, SyncTaskTracker,
};
use fleet_sync_infrastructure::observability::SyncMetrics;
use fleet_sync_testing_utils::{
    builders::NodeBuilder,
    mocks::{MockContainerCacheRepository, MockNodeApi, MockNodeRepository, MockSyncTaskRepository},
};

struct Harness {
    scheduler: AutoSyncScheduler,
    queue: Arc<SyncTaskQueue>,
    guard: Arc<SyncGuard>,
}

fn harness(nodes: Vec<Node>, tasks: Vec<SyncTask>) -> Harness {
    harness_with(
        nodes,
        Arc::new(MockSyncTaskRepository::with_tasks(tasks)),
        MockNodeApi::new(),
        SyncConfig::default(),
    )
}

fn harness_with(
    nodes: Vec<Node>,
    task_repo: Arc<dyn SyncTaskRepository>,
    api: MockNodeApi,
    config: SyncConfig,
) -> Harness {
    let node_repo = Arc::new(MockNodeRepository::with_nodes(nodes));
    let guard = Arc::new(SyncGuard::new());

    let service = Arc::new(ContainerSyncService::new(
        node_repo.clone(),
        Arc::new(MockContainerCacheRepository::new()),
        task_repo.clone(),
        Arc::new(api),
        guard.clone(),
        config.clone(),
        SyncMetrics::new(),
    ));
    let queue = Arc::new(SyncTaskQueue::new(
        service.clone(),
        config.queue_capacity,
        config.max_concurrent_syncs,
        SyncMetrics::new(),
    ));
    let scheduler = AutoSyncScheduler::new(
        node_repo,
        SyncTaskTracker::new(task_repo, config.default_sync_interval_seconds),
        service,
        queue.clone(),
        config.tick_interval(),
    );

    Harness {
        scheduler,
        queue,
        guard,
    }
}

fn auto_node(id: i64) -> Node {
    NodeBuilder::new()
        .with_id(id)
        .with_auto_sync(true)
        .with_sync_interval(300)
        .build()
}

fn task_started(node: &Node, seconds_ago: i64, id: i64) -> SyncTask {
    let mut task = SyncTask::pending(node);
    task.id = id;
    task.status = SyncTaskStatus::Completed;
    task.start_time = Some(Utc::now() - chrono::Duration::seconds(seconds_ago));
    task.end_time = task.start_time;
    task
}

#[tokio::test]
async fn test_enable_and_disable_are_idempotent() {
    let h = harness(vec![], vec![]);
    assert!(!h.scheduler.is_enabled());

    assert!(h.scheduler.enable());
    assert!(!h.scheduler.enable());
    assert!(h.scheduler.is_enabled());

    assert!(h.scheduler.disable());
    assert!(!h.scheduler.disable());
    assert!(!h.scheduler.is_enabled());

    assert!(h.scheduler.enable());
    assert!(h.scheduler.is_enabled());
    h.scheduler.disable();
}

#[tokio::test]
async fn test_check_submits_only_due_nodes() {
    let fresh = auto_node(1);
    let recently_synced = auto_node(2);
    let overdue = auto_node(3);
    let inactive = NodeBuilder::new()
        .with_id(4)
        .with_auto_sync(true)
        .with_status(NodeStatus::Inactive)
        .build();
    let manual_only = NodeBuilder::new().with_id(5).with_auto_sync(false).build();

    let tasks = vec![
        task_started(&recently_synced, 60, 1),
        task_started(&overdue, 600, 2),
    ];
    let h = harness(
        vec![fresh, recently_synced, overdue, inactive, manual_only],
        tasks,
    );

    let submitted = h.scheduler.check_and_sync().await.unwrap();

    assert_eq!(submitted, vec![1, 3]);
    assert_eq!(h.queue.pending(), 2);
}

#[tokio::test]
async fn test_check_skips_node_without_start_time() {
    let node = auto_node(1);
    let mut never_started = SyncTask::pending(&node);
    never_started.id = 1;
    let h = harness(vec![node], vec![never_started]);

    let submitted = h.scheduler.check_and_sync().await.unwrap();

    assert!(submitted.is_empty());
}

#[tokio::test]
async fn test_check_skips_node_already_syncing() {
    let h = harness(vec![auto_node(1), auto_node(2)], vec![]);
    assert!(h.guard.try_acquire(1));

    let submitted = h.scheduler.check_and_sync().await.unwrap();

    assert_eq!(submitted, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_enabled_loop_submits_on_tick() {
    let h = harness(vec![auto_node(1)], vec![]);
    assert!(h.scheduler.enable());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.queue.pending(), 0);

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(h.queue.pending(), 1);

    assert!(h.scheduler.disable());
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.queue.pending(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_node_is_not_queued_again() {
    let tasks = Arc::new(MockSyncTaskRepository::new());
    let config = SyncConfig {
        max_concurrent_syncs: 1,
        ..Default::default()
    };
    let api = MockNodeApi::new().with_delay(Duration::from_secs(40));
    let h = harness_with(vec![auto_node(1), auto_node(2)], tasks.clone(), api, config);

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let runner = {
        let queue = h.queue.clone();
        tokio::spawn(async move { queue.run(shutdown_rx).await })
    };

    let mut rounds = Vec::new();
    for _ in 0..3 {
        rounds.push(h.scheduler.check_and_sync().await.unwrap());
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(rounds, vec![vec![1, 2], vec![], vec![]]);
    let runs_of = |node_id: i64| tasks.all().iter().filter(|t| t.node_id == node_id).count();
    assert_eq!(runs_of(1), 1);
    assert_eq!(runs_of(2), 1);

    shutdown_tx.send(()).unwrap();
    runner.await.unwrap().unwrap();
}

/// 指定节点的最近任务查询失败
struct BrokenLookup {
    inner: MockSyncTaskRepository,
    broken_node: i64,
}

#[async_trait]
impl SyncTaskRepository for BrokenLookup {
    async fn create(&self, task: &SyncTask) -> SyncResult<SyncTask> {
        self.inner.create(task).await
    }

    async fn update(&self, task: &SyncTask) -> SyncResult<SyncTask> {
        self.inner.update(task).await
    }

    async fn find_by_id(&self, id: i64) -> SyncResult<Option<SyncTask>> {
        self.inner.find_by_id(id).await
    }

    async fn find_latest_by_node(&self, node_id: i64) -> SyncResult<Option<SyncTask>> {
        if node_id == self.broken_node {
            return Err(SyncError::DatabaseOperation("磁盘 I/O 错误".to_string()));
        }
        self.inner.find_latest_by_node(node_id).await
    }

    async fn list_recent(&self, limit: i64) -> SyncResult<Vec<SyncTask>> {
        self.inner.list_recent(limit).await
    }

    async fn list_by_node(&self, node_id: i64, limit: i64) -> SyncResult<Vec<SyncTask>> {
        self.inner.list_by_node(node_id, limit).await
    }

    async fn fail_unfinished(&self, message: &str, ended_at: DateTime<Utc>) -> SyncResult<u64> {
        self.inner.fail_unfinished(message, ended_at).await
    }
}

#[tokio::test]
async fn test_lookup_error_skips_only_that_node() {
    let tasks = Arc::new(BrokenLookup {
        inner: MockSyncTaskRepository::new(),
        broken_node: 1,
    });
    let h = harness_with(
        vec![auto_node(1), auto_node(2), auto_node(3)],
        tasks,
        MockNodeApi::new(),
        SyncConfig::default(),
    );

    let submitted = h.scheduler.check_and_sync().await.unwrap();

    assert_eq!(submitted, vec![2, 3]);
    assert!(!h.queue.is_queued(1));
}
