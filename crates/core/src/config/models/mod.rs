pub mod app_config;
pub mod database;
pub mod node_client;
pub mod observability;
pub mod sync;

pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use node_client::NodeClientConfig;
pub use observability::ObservabilityConfig;
pub use sync::{NodeCacheConfig, SyncConfig};
