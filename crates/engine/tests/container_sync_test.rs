use std::sync::Arc;
use std::time::Duration;

use fleet_sync_core::{config::models::SyncConfig, SyncError};
use fleet_sync_domain::{
    entities::{Node, NodeStatus, SyncTaskStatus},
    ports::ApiEnvelope,
};
use fleet_sync_engine::{ContainerSyncService, NodeSyncService, SyncGuard, SyncMode, SyncTrigger};
use fleet_sync_infrastructure::observability::SyncMetrics;
use fleet_sync_testing_utils::{
    builders::{container_listing_entry, info_path, NodeBuilder},
    helpers::init_test_logging,
    mocks::{MockContainerCacheRepository, MockNodeApi, MockNodeRepository, MockSyncTaskRepository},
};
use serde_json::json;

struct Harness {
    containers: Arc<MockContainerCacheRepository>,
    tasks: Arc<MockSyncTaskRepository>,
    api: Arc<MockNodeApi>,
    guard: Arc<SyncGuard>,
    service: Arc<ContainerSyncService>,
}

fn sync_config() -> SyncConfig {
    SyncConfig {
        default_batch_interval_seconds: 0,
        node_pause_seconds: 0,
        ..Default::default()
    }
}

fn node(id: i64) -> Node {
    NodeBuilder::new()
        .with_id(id)
        .with_name(&format!("node-{id}"))
        .with_batch_interval(0)
        .build()
}

fn harness(nodes: Vec<Node>, api: MockNodeApi) -> Harness {
    init_test_logging();
    let containers = Arc::new(MockContainerCacheRepository::new());
    let tasks = Arc::new(MockSyncTaskRepository::new());
    let api = Arc::new(api);
    let guard = Arc::new(SyncGuard::new());
    let service = Arc::new(ContainerSyncService::new(
        Arc::new(MockNodeRepository::with_nodes(nodes)),
        containers.clone(),
        tasks.clone(),
        api.clone(),
        guard.clone(),
        sync_config(),
        SyncMetrics::new(),
    ));

    Harness {
        containers,
        tasks,
        api,
        guard,
        service,
    }
}

#[tokio::test]
async fn test_incremental_sync_caches_every_container() {
    let h = harness(
        vec![node(1)],
        MockNodeApi::new().with_containers(1, &["web-1", "web-2", "db-1"]),
    );

    let task = h
        .service
        .sync_node(1, SyncMode::Incremental, SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(task.status, SyncTaskStatus::Completed);
    assert_eq!(task.total_count, 3);
    assert_eq!(task.success_count, 3);
    assert_eq!(task.failed_count, 0);
    assert!(task.is_finished());
    assert_eq!(h.containers.hostnames(1), vec!["db-1", "web-1", "web-2"]);
    assert_eq!(h.api.call_count("/api/info"), 3);
    assert_eq!(h.api.call_count("/api/cache/containers/refresh"), 0);

    let cached = h.containers.get(1, "web-1").unwrap();
    assert_eq!(cached.node_name, "node-1");
    assert_eq!(cached.memory, "512MB");
    assert_eq!(cached.memory_total, 512 * 1_048_576);
    assert_eq!(cached.traffic_total, 1000);
    assert_eq!(cached.traffic_in, 500);
    assert_eq!(cached.traffic_out, 500);
    assert_eq!(cached.cpu_usage, 1.5);
    assert!(!h.guard.is_syncing(1));
}

#[tokio::test]
async fn test_successful_run_purges_unseen_containers() {
    let h = harness(
        vec![node(1)],
        MockNodeApi::new().with_containers(1, &["a", "b", "c"]),
    );
    h.service
        .sync_node(1, SyncMode::Incremental, SyncTrigger::Manual)
        .await
        .unwrap();
    assert_eq!(h.containers.hostnames(1), vec!["a", "b", "c"]);

    h.api.set_containers(1, &["a", "c"]);
    h.service
        .sync_node(1, SyncMode::Incremental, SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(h.containers.hostnames(1), vec!["a", "c"]);
}

#[tokio::test]
async fn test_incremental_listing_failure_keeps_cache() {
    let h = harness(vec![node(1)], MockNodeApi::new().with_containers(1, &["a", "b"]));
    h.service
        .sync_node(1, SyncMode::Incremental, SyncTrigger::Manual)
        .await
        .unwrap();

    h.api.set_response(
        1,
        "/api/cache/containers",
        ApiEnvelope::failure("请求失败: 连接超时"),
    );
    let task = h
        .service
        .sync_node(1, SyncMode::Incremental, SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(task.status, SyncTaskStatus::Failed);
    assert!(task.error_message.starts_with("获取容器列表失败"));
    assert!(task.end_time.is_some());
    assert_eq!(h.containers.hostnames(1), vec!["a", "b"]);
}

#[tokio::test]
async fn test_full_refresh_listing_failure_purges_node_cache() {
    let h = harness(
        vec![node(1), node(2)],
        MockNodeApi::new()
            .with_containers(1, &["a", "b"])
            .with_containers(2, &["x"]),
    );
    h.service
        .sync_node(1, SyncMode::FullRefresh, SyncTrigger::Manual)
        .await
        .unwrap();
    h.service
        .sync_node(2, SyncMode::FullRefresh, SyncTrigger::Manual)
        .await
        .unwrap();
    assert_eq!(h.containers.count(), 3);

    h.api.set_response(
        1,
        "/api/cache/containers",
        ApiEnvelope {
            code: 401,
            msg: "apikey错误".to_string(),
            data: json!(null),
        },
    );
    let task = h
        .service
        .sync_node(1, SyncMode::FullRefresh, SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(task.status, SyncTaskStatus::Failed);
    assert_eq!(task.error_message, "获取容器列表失败: apikey错误");
    assert!(h.containers.hostnames(1).is_empty());
    assert_eq!(h.containers.hostnames(2), vec!["x"]);
}

#[tokio::test]
async fn test_full_refresh_wrong_shape_purges_node_cache() {
    let h = harness(vec![node(1)], MockNodeApi::new().with_containers(1, &["a"]));
    h.service
        .sync_node(1, SyncMode::FullRefresh, SyncTrigger::Manual)
        .await
        .unwrap();

    h.api.set_response(
        1,
        "/api/cache/containers",
        ApiEnvelope::success(json!({"hostname": "a"})),
    );
    let task = h
        .service
        .sync_node(1, SyncMode::FullRefresh, SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(task.status, SyncTaskStatus::Failed);
    assert_eq!(task.error_message, "容器列表格式错误");
    assert_eq!(h.containers.count(), 0);
}

#[tokio::test]
async fn test_full_refresh_upserts_listing_directly() {
    let h = harness(vec![node(1)], MockNodeApi::new().with_containers(1, &["a", "b"]));

    let task = h
        .service
        .sync_node(1, SyncMode::FullRefresh, SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(task.status, SyncTaskStatus::Completed);
    assert_eq!(task.success_count, 2);
    assert_eq!(h.api.call_count("/api/cache/containers/refresh"), 1);
    assert_eq!(h.api.call_count("/api/info"), 0);

    let cached = h.containers.get(1, "a").unwrap();
    assert_eq!(cached.memory, "512MB");
    assert_eq!(cached.disk, "10GB");
    assert_eq!(cached.traffic_limit, 100);
    assert_eq!(cached.ingress, "100Mbit");
    assert_eq!(cached.memory_total, 0);
}

#[tokio::test]
async fn test_full_refresh_continues_when_refresh_fails() {
    let h = harness(vec![node(1)], MockNodeApi::new().with_containers(1, &["a"]));
    h.api.set_response(
        1,
        "/api/cache/containers/refresh",
        ApiEnvelope::failure("请求失败: 连接被拒绝"),
    );

    let task = h
        .service
        .sync_node(1, SyncMode::FullRefresh, SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(task.status, SyncTaskStatus::Completed);
    assert_eq!(h.containers.hostnames(1), vec!["a"]);
}

#[tokio::test]
async fn test_invalid_entries_and_detail_failures_are_counted() {
    let api = MockNodeApi::new().with_containers(1, &["a", "b"]);
    api.set_response(
        1,
        "/api/cache/containers",
        ApiEnvelope::success(json!([
            container_listing_entry("a"),
            container_listing_entry("b"),
            {"status": "Running"},
            "not-an-object"
        ])),
    );
    api.set_response(1, &info_path("b"), ApiEnvelope::failure("容器不存在"));
    let h = harness(vec![node(1)], api);

    let task = h
        .service
        .sync_node(1, SyncMode::Incremental, SyncTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(task.status, SyncTaskStatus::Completed);
    assert_eq!(task.total_count, 4);
    assert_eq!(task.success_count, 1);
    assert_eq!(task.failed_count, 3);
    assert_eq!(h.containers.hostnames(1), vec!["a"]);
}

#[tokio::test]
async fn test_unknown_node_is_rejected_without_task() {
    let h = harness(vec![node(1)], MockNodeApi::new());

    let err = h
        .service
        .sync_node(99, SyncMode::Incremental, SyncTrigger::Manual)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NodeNotFound { id: 99 }));
    assert_eq!(h.tasks.count(), 0);
    assert!(!h.guard.is_syncing(99));
}

#[tokio::test]
async fn test_concurrent_sync_of_same_node_is_rejected() {
    let h = harness(
        vec![node(1)],
        MockNodeApi::new()
            .with_containers(1, &["a"])
            .with_delay(Duration::from_millis(200)),
    );

    let service = h.service.clone();
    let first = tokio::spawn(async move {
        service
            .sync_node(1, SyncMode::Incremental, SyncTrigger::Auto)
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.service.is_syncing(1));
    let err = h
        .service
        .sync_node(1, SyncMode::FullRefresh, SyncTrigger::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SyncInProgress { node_id: 1 }));

    let task = first.await.unwrap().unwrap();
    assert_eq!(task.status, SyncTaskStatus::Completed);
    assert!(!h.service.is_syncing(1));
    assert_eq!(h.tasks.count(), 1);
}

#[tokio::test]
async fn test_sync_all_nodes_only_touches_active_nodes() {
    let inactive = NodeBuilder::new()
        .with_id(3)
        .with_status(NodeStatus::Inactive)
        .build();
    let h = harness(
        vec![node(1), node(2), inactive],
        MockNodeApi::new()
            .with_containers(1, &["a"])
            .with_containers(2, &["b", "c"])
            .with_containers(3, &["z"]),
    );

    let tasks = h.service.sync_all_nodes().await.unwrap();

    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.status == SyncTaskStatus::Completed));
    assert_eq!(h.containers.hostnames(2), vec!["b", "c"]);
    assert!(h.containers.hostnames(3).is_empty());
}

#[tokio::test]
async fn test_node_sync_status_reports_latest_task() {
    let h = harness(
        vec![node(1), node(2)],
        MockNodeApi::new().with_containers(1, &["a"]),
    );
    h.service
        .sync_node(1, SyncMode::Incremental, SyncTrigger::Manual)
        .await
        .unwrap();

    let statuses = h.service.node_sync_status().await.unwrap();

    assert_eq!(statuses.len(), 2);
    let first = statuses.iter().find(|s| s.node.id == 1).unwrap();
    assert_eq!(
        first.last_task.as_ref().map(|t| t.status),
        Some(SyncTaskStatus::Completed)
    );
    let second = statuses.iter().find(|s| s.node.id == 2).unwrap();
    assert!(second.last_task.is_none());
}
