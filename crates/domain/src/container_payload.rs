//! 节点返回的容器数据结构
//!
//! 节点接口返回的 JSON 字段类型并不可靠，这里的每个字段都是可选的：
//! 字段缺失或类型不符时视为未提供，而不是让整条记录解析失败。

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::entities::{ContainerCacheUpdate, Node};
use fleet_sync_core::{SyncError, SyncResult};

const BYTES_PER_MB: f64 = 1_048_576.0;

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// 容器配置子对象（列表接口的 `config` 字段）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfigPayload {
    #[serde(default, deserialize_with = "lenient")]
    pub memory: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub disk: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub traffic_limit: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub ingress: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub egress: Option<String>,
}

/// 单个容器的数据，来自列表接口或 `/api/info` 详情接口
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerPayload {
    #[serde(default, deserialize_with = "lenient")]
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub ipv4: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub ipv6: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub cpus: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub config: Option<ContainerConfigPayload>,
    /// 内存大小（MB）
    #[serde(default, deserialize_with = "lenient")]
    pub memory: Option<f64>,
    /// 磁盘大小（MB）
    #[serde(default, deserialize_with = "lenient")]
    pub disk: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub cpu_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub cpu_usage: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub memory_usage_raw: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub disk_usage_raw: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub traffic_usage_raw: Option<f64>,
}

fn to_count(value: Option<f64>) -> i64 {
    value.map(|v| v.max(0.0) as i64).unwrap_or(0)
}

fn mb_to_bytes(value: Option<f64>) -> i64 {
    to_count(value.map(|mb| mb * BYTES_PER_MB))
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|s| !s.is_empty()).cloned()
}

impl ContainerPayload {
    /// 从节点返回的 JSON 解析，非对象时报错
    pub fn from_value(value: &Value) -> SyncResult<Self> {
        if !value.is_object() {
            return Err(SyncError::NodeApi("容器数据不是JSON对象".to_string()));
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    /// 非空的主机名
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref().filter(|h| !h.is_empty())
    }

    /// 内存规格：优先 `config.memory`，否则由顶层 `memory`（MB）格式化
    pub fn memory_spec(&self) -> Option<String> {
        non_empty(self.config.as_ref().and_then(|c| c.memory.as_ref()))
            .or_else(|| self.memory.map(|mb| format!("{mb:.0}MB")))
    }

    /// 磁盘规格：优先 `config.disk`，否则由顶层 `disk`（MB）格式化
    pub fn disk_spec(&self) -> Option<String> {
        non_empty(self.config.as_ref().and_then(|c| c.disk.as_ref()))
            .or_else(|| self.disk.map(|mb| format!("{mb:.0}MB")))
    }

    /// CPU 使用率：优先 `cpu_percent`，否则 `cpu_usage`
    pub fn cpu_usage(&self) -> f64 {
        self.cpu_percent.or(self.cpu_usage).unwrap_or(0.0)
    }

    /// 流量入/出方向
    ///
    /// 节点只上报总量，这里按各一半拆分，是近似值而非实测。
    pub fn traffic_split(&self) -> (i64, i64) {
        let half = self.traffic_usage_raw.map(|raw| raw * 0.5);
        (to_count(half), to_count(half))
    }

    /// 转换为缓存写入，主机名为空时报错
    pub fn into_cache_update(
        self,
        node: &Node,
        synced_at: DateTime<Utc>,
    ) -> SyncResult<ContainerCacheUpdate> {
        let hostname = self
            .hostname()
            .ok_or_else(|| SyncError::NodeApi("hostname为空".to_string()))?
            .to_string();

        let memory = self.memory_spec();
        let disk = self.disk_spec();
        let cpu_usage = self.cpu_usage();
        let (traffic_in, traffic_out) = self.traffic_split();
        let config = self.config.unwrap_or_default();

        Ok(ContainerCacheUpdate {
            node_id: node.id,
            node_name: node.name.clone(),
            hostname,
            status: self.status,
            ipv4: self.ipv4,
            ipv6: self.ipv6,
            image: self.image,
            cpus: self.cpus.map(|c| c as i64),
            memory,
            disk,
            traffic_limit: config
                .traffic_limit
                .map(|limit| limit as i64)
                .filter(|limit| *limit > 0),
            ingress: non_empty(config.ingress.as_ref()),
            egress: non_empty(config.egress.as_ref()),
            cpu_usage,
            memory_usage: to_count(self.memory_usage_raw),
            memory_total: mb_to_bytes(self.memory),
            disk_usage: to_count(self.disk_usage_raw),
            disk_total: mb_to_bytes(self.disk),
            traffic_total: to_count(self.traffic_usage_raw),
            traffic_in,
            traffic_out,
            last_sync: synced_at,
        })
    }
}
