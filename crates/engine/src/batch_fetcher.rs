use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use fleet_sync_domain::{
    entities::Node,
    ports::{ApiMethod, NodeApi},
};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache_upserter::CacheUpserter;

/// 单个容器详情接口路径
pub fn info_path(hostname: &str) -> String {
    format!("/api/info?hostname={hostname}")
}

/// 列表条目中的非空主机名
pub fn entry_hostname(entry: &Value) -> Option<&str> {
    entry
        .get("hostname")
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())
}

/// 列表中出现过的全部主机名
pub fn listing_hostnames(listing: &[Value]) -> HashSet<String> {
    listing
        .iter()
        .filter_map(entry_hostname)
        .map(str::to_string)
        .collect()
}

/// 分批参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub batch_size: usize,
    pub pause: Duration,
}

impl BatchPlan {
    /// 取节点自身的批次配置，非正数时回落到默认值
    pub fn for_node(node: &Node, default_size: i64, default_interval_seconds: i64) -> Self {
        let batch_size = if node.batch_size > 0 {
            node.batch_size
        } else {
            default_size.max(1)
        };
        let interval = if node.batch_interval > 0 {
            node.batch_interval
        } else {
            default_interval_seconds.max(0)
        };

        Self {
            batch_size: batch_size as usize,
            pause: Duration::from_secs(interval as u64),
        }
    }
}

/// 一次分批拉取的结果
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// 每个批次的条目数，按执行顺序
    pub batch_sizes: Vec<usize>,
    /// 批次之间的停顿次数
    pub pauses: usize,
    /// 列表中出现的主机名，用于清理缓存
    pub seen: HashSet<String>,
}

/// 分批拉取容器详情并写入缓存
///
/// 批次按列表顺序执行；批次内每个容器并发拉取，全部结束后才进入下一批。
#[derive(Clone)]
pub struct BatchFetcher {
    node_api: Arc<dyn NodeApi>,
    upserter: CacheUpserter,
}

impl BatchFetcher {
    pub fn new(node_api: Arc<dyn NodeApi>, upserter: CacheUpserter) -> Self {
        Self { node_api, upserter }
    }

    pub async fn run(&self, node: &Node, listing: &[Value], plan: &BatchPlan) -> BatchReport {
        let mut report = BatchReport {
            total: listing.len(),
            seen: listing_hostnames(listing),
            ..Default::default()
        };

        let batch_size = plan.batch_size.max(1);
        let batch_count = listing.len().div_ceil(batch_size);
        info!(
            node_id = node.id,
            total = listing.len(),
            batch_size,
            pause_secs = plan.pause.as_secs(),
            "节点 {} 开始分批同步容器",
            node.name
        );

        for (index, batch) in listing.chunks(batch_size).enumerate() {
            let start = index * batch_size;
            debug!(
                "处理容器批次 {}-{}/{}",
                start + 1,
                start + batch.len(),
                listing.len()
            );
            report.batch_sizes.push(batch.len());

            let results = join_all(batch.iter().map(|entry| self.fetch_one(node, entry))).await;
            for ok in results {
                if ok {
                    report.success += 1;
                } else {
                    report.failed += 1;
                }
            }

            if index + 1 < batch_count {
                report.pauses += 1;
                if !plan.pause.is_zero() {
                    debug!("等待 {:?} 后处理下一批", plan.pause);
                    tokio::time::sleep(plan.pause).await;
                }
            }
        }

        report
    }

    async fn fetch_one(&self, node: &Node, entry: &Value) -> bool {
        let Some(hostname) = entry_hostname(entry) else {
            warn!(node_id = node.id, "容器条目缺少hostname，跳过");
            return false;
        };

        let envelope = self
            .node_api
            .call(node, ApiMethod::Get, &info_path(hostname), None)
            .await;
        if !envelope.is_success() {
            warn!(node_id = node.id, hostname, "容器同步失败: {}", envelope.msg);
            return false;
        }
        if !envelope.data.is_object() {
            warn!(node_id = node.id, hostname, "容器详情不是JSON对象");
            return false;
        }

        match self.upserter.upsert(node, &envelope.data).await {
            Ok(_) => true,
            Err(e) => {
                warn!(node_id = node.id, hostname, "容器缓存更新失败: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_prefers_node_settings() {
        let mut node = Node::new("n", "https://n");
        node.batch_size = 3;
        node.batch_interval = 7;

        let plan = BatchPlan::for_node(&node, 5, 5);
        assert_eq!(plan.batch_size, 3);
        assert_eq!(plan.pause, Duration::from_secs(7));
    }

    #[test]
    fn test_plan_falls_back_on_non_positive() {
        let mut node = Node::new("n", "https://n");
        node.batch_size = 0;
        node.batch_interval = -1;

        let plan = BatchPlan::for_node(&node, 5, 4);
        assert_eq!(plan.batch_size, 5);
        assert_eq!(plan.pause, Duration::from_secs(4));

        let plan = BatchPlan::for_node(&node, 0, 0);
        assert_eq!(plan.batch_size, 1);
        assert!(plan.pause.is_zero());
    }

    #[test]
    fn test_listing_hostnames_skips_invalid_entries() {
        let listing = vec![
            json!({"hostname": "a"}),
            json!({"hostname": ""}),
            json!({"status": "Running"}),
            json!("b"),
            json!({"hostname": 5}),
            json!({"hostname": "c"}),
        ];

        let seen = listing_hostnames(&listing);
        assert_eq!(seen.len(), 2);
        assert!(seen.contains("a"));
        assert!(seen.contains("c"));
    }

    #[test]
    fn test_info_path() {
        assert_eq!(info_path("web-1"), "/api/info?hostname=web-1");
    }
}
