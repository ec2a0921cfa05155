pub mod sqlite_container_cache_repository;
pub mod sqlite_node_info_cache_repository;
pub mod sqlite_node_repository;
pub mod sqlite_sync_task_repository;

pub use sqlite_container_cache_repository::SqliteContainerCacheRepository;
pub use sqlite_node_info_cache_repository::SqliteNodeInfoCacheRepository;
pub use sqlite_node_repository::SqliteNodeRepository;
pub use sqlite_sync_task_repository::SqliteSyncTaskRepository;
