use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 节点状态，由连通性检查写入
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    Inactive,
    Error,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Inactive => "inactive",
            NodeStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Sqlite> for NodeStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for NodeStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "active" => Ok(NodeStatus::Active),
            "inactive" => Ok(NodeStatus::Inactive),
            "error" => Ok(NodeStatus::Error),
            _ => Err(format!("Invalid node status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for NodeStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 受管节点
///
/// `sync_interval`、`batch_size`、`batch_interval` 为非正数时表示未设置，由同步引擎回退到默认值。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub address: String,
    pub api_key: String,
    pub status: NodeStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub auto_sync: bool,
    pub sync_interval: i64,
    pub batch_size: i64,
    pub batch_interval: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            description: String::new(),
            address: address.into(),
            api_key: String::new(),
            status: NodeStatus::Inactive,
            last_check: None,
            auto_sync: false,
            sync_interval: 300,
            batch_size: 5,
            batch_interval: 5,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    /// 是否参与自动同步
    pub fn is_auto_sync_eligible(&self) -> bool {
        self.is_active() && self.auto_sync
    }
}

/// 节点查询条件
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub status: Option<NodeStatus>,
    pub auto_sync: Option<bool>,
}

impl NodeFilter {
    pub fn active() -> Self {
        Self {
            status: Some(NodeStatus::Active),
            auto_sync: None,
        }
    }

    pub fn auto_sync_candidates() -> Self {
        Self {
            status: Some(NodeStatus::Active),
            auto_sync: Some(true),
        }
    }

    pub fn matches(&self, node: &Node) -> bool {
        self.status.map_or(true, |status| node.status == status)
            && self.auto_sync.map_or(true, |auto_sync| node.auto_sync == auto_sync)
    }
}

/// 容器缓存记录，每个 (node_id, hostname) 至多一行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerCache {
    pub id: i64,
    pub node_id: i64,
    pub node_name: String,
    pub hostname: String,
    pub status: String,
    pub ipv4: String,
    pub ipv6: String,
    pub image: String,
    pub cpus: i64,
    pub memory: String,
    pub disk: String,
    pub traffic_limit: i64,
    pub ingress: String,
    pub egress: String,
    pub cpu_usage: f64,
    pub memory_usage: i64,
    pub memory_total: i64,
    pub disk_usage: i64,
    pub disk_total: i64,
    pub traffic_total: i64,
    pub traffic_in: i64,
    pub traffic_out: i64,
    pub last_sync: DateTime<Utc>,
    pub sync_error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 一次容器缓存写入
///
/// 描述性字段为 `None` 时保留已存储的值；计数器总是覆盖。
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerCacheUpdate {
    pub node_id: i64,
    pub node_name: String,
    pub hostname: String,
    pub status: Option<String>,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub image: Option<String>,
    pub cpus: Option<i64>,
    pub memory: Option<String>,
    pub disk: Option<String>,
    pub traffic_limit: Option<i64>,
    pub ingress: Option<String>,
    pub egress: Option<String>,
    pub cpu_usage: f64,
    pub memory_usage: i64,
    pub memory_total: i64,
    pub disk_usage: i64,
    pub disk_total: i64,
    pub traffic_total: i64,
    pub traffic_in: i64,
    pub traffic_out: i64,
    pub last_sync: DateTime<Utc>,
}

impl ContainerCacheUpdate {
    /// 将本次写入合并到已有记录（或新记录）上
    pub fn apply_to(&self, existing: Option<&ContainerCache>, id: i64) -> ContainerCache {
        let now = self.last_sync;
        let keep = |new: &Option<String>, old: Option<&String>| {
            new.clone()
                .or_else(|| old.cloned())
                .unwrap_or_default()
        };

        ContainerCache {
            id: existing.map(|c| c.id).unwrap_or(id),
            node_id: self.node_id,
            node_name: self.node_name.clone(),
            hostname: self.hostname.clone(),
            status: keep(&self.status, existing.map(|c| &c.status)),
            ipv4: keep(&self.ipv4, existing.map(|c| &c.ipv4)),
            ipv6: keep(&self.ipv6, existing.map(|c| &c.ipv6)),
            image: keep(&self.image, existing.map(|c| &c.image)),
            cpus: self
                .cpus
                .or(existing.map(|c| c.cpus))
                .unwrap_or_default(),
            memory: keep(&self.memory, existing.map(|c| &c.memory)),
            disk: keep(&self.disk, existing.map(|c| &c.disk)),
            traffic_limit: self
                .traffic_limit
                .or(existing.map(|c| c.traffic_limit))
                .unwrap_or_default(),
            ingress: keep(&self.ingress, existing.map(|c| &c.ingress)),
            egress: keep(&self.egress, existing.map(|c| &c.egress)),
            cpu_usage: self.cpu_usage,
            memory_usage: self.memory_usage,
            memory_total: self.memory_total,
            disk_usage: self.disk_usage,
            disk_total: self.disk_total,
            traffic_total: self.traffic_total,
            traffic_in: self.traffic_in,
            traffic_out: self.traffic_out,
            last_sync: self.last_sync,
            sync_error: String::new(),
            created_at: existing.map(|c| c.created_at).unwrap_or(now),
            updated_at: now,
        }
    }
}

/// 同步任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SyncTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTaskStatus::Pending => "pending",
            SyncTaskStatus::Running => "running",
            SyncTaskStatus::Completed => "completed",
            SyncTaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncTaskStatus::Completed | SyncTaskStatus::Failed)
    }
}

impl std::fmt::Display for SyncTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Sqlite> for SyncTaskStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for SyncTaskStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "pending" => Ok(SyncTaskStatus::Pending),
            "running" => Ok(SyncTaskStatus::Running),
            "completed" => Ok(SyncTaskStatus::Completed),
            "failed" => Ok(SyncTaskStatus::Failed),
            _ => Err(format!("Invalid sync task status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for SyncTaskStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 同步任务审计记录，每次同步尝试一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: i64,
    pub node_id: i64,
    pub node_name: String,
    pub status: SyncTaskStatus,
    pub total_count: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncTask {
    /// 新建 pending 状态的任务（尚未持久化）
    pub fn pending(node: &Node) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            node_id: node.id,
            node_name: node.name.clone(),
            status: SyncTaskStatus::Pending,
            total_count: 0,
            success_count: 0,
            failed_count: 0,
            start_time: None,
            end_time: None,
            error_message: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

/// 节点最近一次同步状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSyncStatus {
    pub node: Node,
    pub last_task: Option<SyncTask>,
}

/// 节点系统信息缓存，每个节点至多一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfoCache {
    pub id: i64,
    pub node_id: i64,
    pub system_info: String,
    pub last_sync: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
