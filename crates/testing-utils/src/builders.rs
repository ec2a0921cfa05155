//! Test data builders for creating test entities

use chrono::Utc;
use fleet_sync_domain::entities::{Node, NodeStatus};
use serde_json::{json, Value};

/// Builder for creating test Node entities
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new() -> Self {
        let mut node = Node::new("test-node", "https://127.0.0.1:8443");
        node.id = 1;
        node.status = NodeStatus::Active;
        Self { node }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.node.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.node.name = name.to_string();
        self
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.node.address = address.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.node.api_key = api_key.to_string();
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.node.status = status;
        self
    }

    pub fn with_auto_sync(mut self, auto_sync: bool) -> Self {
        self.node.auto_sync = auto_sync;
        self
    }

    pub fn with_sync_interval(mut self, seconds: i64) -> Self {
        self.node.sync_interval = seconds;
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.node.batch_size = batch_size;
        self
    }

    /// Batch interval in seconds; tests normally set 0 to avoid sleeping
    pub fn with_batch_interval(mut self, seconds: i64) -> Self {
        self.node.batch_interval = seconds;
        self
    }

    pub fn build(mut self) -> Node {
        self.node.updated_at = Utc::now();
        self.node
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Container listing entry as returned by `/api/cache/containers`
pub fn container_listing_entry(hostname: &str) -> Value {
    json!({
        "hostname": hostname,
        "status": "Running",
        "ipv4": "10.10.0.2",
        "ipv6": "",
        "image": "debian12",
        "cpus": 1,
        "config": {
            "memory": "512MB",
            "disk": "10GB",
            "traffic_limit": 100,
            "ingress": "100Mbit",
            "egress": "100Mbit"
        }
    })
}

/// Container detail as returned by `/api/info?hostname=X`
pub fn container_detail(hostname: &str) -> Value {
    json!({
        "hostname": hostname,
        "status": "Running",
        "ipv4": "10.10.0.2",
        "image": "debian12",
        "cpus": 1,
        "memory": 512,
        "disk": 10240,
        "cpu_percent": 1.5,
        "memory_usage_raw": 104857600,
        "disk_usage_raw": 2147483648u64,
        "traffic_usage_raw": 1000
    })
}

/// Path of the per-container detail endpoint
pub fn info_path(hostname: &str) -> String {
    format!("/api/info?hostname={hostname}")
}
