//! 同步引擎指标

pub mod metrics_collector;

pub use metrics_collector::{install_prometheus_exporter, SyncMetrics};
