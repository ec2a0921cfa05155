//! 节点容器同步引擎
//!
//! 负责把各节点的容器状态拉取到本地缓存，并维护同步任务记录、
//! 自动同步调度和节点系统信息缓存。

pub mod auto_sync;
pub mod batch_fetcher;
pub mod cache_upserter;
pub mod container_sync;
pub mod engine;
pub mod health;
pub mod node_cache;
pub mod sync_guard;
pub mod task_queue;
pub mod task_tracker;

pub use auto_sync::AutoSyncScheduler;
pub use batch_fetcher::{BatchFetcher, BatchPlan, BatchReport};
pub use cache_upserter::CacheUpserter;
pub use container_sync::{ContainerSyncService, NodeSyncService, SyncMode, SyncTrigger};
pub use engine::{EngineDependencies, SyncEngine};
pub use health::NodeHealthChecker;
pub use node_cache::{NodeCacheRefresher, RefreshSummary};
pub use sync_guard::{SyncGuard, SyncPermit};
pub use task_queue::{SyncRequest, SyncTaskQueue};
pub use task_tracker::{SyncCounts, SyncTaskTracker};
