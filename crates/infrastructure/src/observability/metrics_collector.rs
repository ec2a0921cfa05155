use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// 同步引擎指标收集器
///
/// 未安装全局 recorder 时所有记录都是空操作。
#[derive(Clone)]
pub struct SyncMetrics {
    sync_completed_total: Counter,
    sync_failed_total: Counter,
    sync_rejected_total: Counter,
    container_fetch_success_total: Counter,
    container_fetch_failed_total: Counter,
    cache_purged_total: Counter,
    sync_duration: Histogram,
    syncs_in_flight: Gauge,
    node_probe_success_total: Counter,
    node_probe_failed_total: Counter,
    queue_depth: Gauge,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            sync_completed_total: counter!("fleet_sync_runs_total", "outcome" => "completed"),
            sync_failed_total: counter!("fleet_sync_runs_total", "outcome" => "failed"),
            sync_rejected_total: counter!("fleet_sync_rejected_total"),
            container_fetch_success_total: counter!("fleet_sync_container_fetch_total", "result" => "success"),
            container_fetch_failed_total: counter!("fleet_sync_container_fetch_total", "result" => "failed"),
            cache_purged_total: counter!("fleet_sync_cache_purged_total"),
            sync_duration: histogram!("fleet_sync_duration_seconds"),
            syncs_in_flight: gauge!("fleet_sync_in_flight"),
            node_probe_success_total: counter!("fleet_sync_node_probe_total", "result" => "success"),
            node_probe_failed_total: counter!("fleet_sync_node_probe_total", "result" => "failed"),
            queue_depth: gauge!("fleet_sync_queue_depth"),
        }
    }

    /// 记录一次同步结束
    pub fn record_sync_finished(&self, succeeded: bool, duration: Duration) {
        if succeeded {
            self.sync_completed_total.increment(1);
        } else {
            self.sync_failed_total.increment(1);
        }
        self.sync_duration.record(duration.as_secs_f64());
    }

    pub fn record_sync_rejected(&self) {
        self.sync_rejected_total.increment(1);
    }

    pub fn record_container_fetches(&self, success: u64, failed: u64) {
        self.container_fetch_success_total.increment(success);
        self.container_fetch_failed_total.increment(failed);
    }

    pub fn record_cache_purged(&self, count: u64) {
        self.cache_purged_total.increment(count);
    }

    pub fn sync_started(&self) {
        self.syncs_in_flight.increment(1.0);
    }

    pub fn sync_ended(&self) {
        self.syncs_in_flight.decrement(1.0);
    }

    pub fn record_node_probe(&self, succeeded: bool) {
        if succeeded {
            self.node_probe_success_total.increment(1);
        } else {
            self.node_probe_failed_total.increment(1);
        }
    }

    pub fn update_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 安装 Prometheus 导出器并监听指定地址，需要在 tokio 运行时内调用
pub fn install_prometheus_exporter(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .map_err(|e| anyhow::anyhow!("无效的指标监听地址 {bind_address}: {e}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("安装Prometheus导出器失败: {e}"))?;

    info!("Prometheus 指标导出器已启动: {}", addr);
    Ok(())
}
