use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 容器同步配置
///
/// 节点自身的批次参数优先；节点未设置（非正数）时回退到这里的默认值。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 启动时是否开启自动同步
    pub auto_sync_enabled: bool,
    /// 自动同步检查周期（秒）
    pub tick_interval_seconds: u64,
    /// 节点未配置同步间隔时使用的默认值（秒）
    pub default_sync_interval_seconds: i64,
    pub default_batch_size: i64,
    pub default_batch_interval_seconds: i64,
    /// 后台同步任务的最大并发数
    pub max_concurrent_syncs: usize,
    /// 后台同步队列容量
    pub queue_capacity: usize,
    /// 顺序同步所有节点时，节点之间的默认间隔（秒）
    pub node_pause_seconds: i64,
    /// 同步任务列表默认返回条数
    pub task_history_limit: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync_enabled: true,
            tick_interval_seconds: 30,
            default_sync_interval_seconds: 300,
            default_batch_size: 5,
            default_batch_interval_seconds: 5,
            max_concurrent_syncs: 8,
            queue_capacity: 256,
            node_pause_seconds: 2,
            task_history_limit: 50,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_seconds == 0 {
            return Err(anyhow::anyhow!("自动同步检查周期必须大于0"));
        }

        if self.default_sync_interval_seconds <= 0 {
            return Err(anyhow::anyhow!("默认同步间隔必须大于0"));
        }

        if self.default_batch_size <= 0 {
            return Err(anyhow::anyhow!("默认批次大小必须大于0"));
        }

        if self.default_batch_interval_seconds < 0 {
            return Err(anyhow::anyhow!("默认批次间隔不能为负数"));
        }

        if self.max_concurrent_syncs == 0 {
            return Err(anyhow::anyhow!("最大并发同步数必须大于0"));
        }

        if self.queue_capacity == 0 {
            return Err(anyhow::anyhow!("同步队列容量必须大于0"));
        }

        if self.task_history_limit <= 0 {
            return Err(anyhow::anyhow!("任务列表条数必须大于0"));
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }
}

/// 节点系统信息缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeCacheConfig {
    pub enabled: bool,
    pub refresh_interval_seconds: u64,
    pub max_concurrent_probes: usize,
}

impl Default for NodeCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval_seconds: 3600,
            max_concurrent_probes: 5,
        }
    }
}

impl NodeCacheConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.refresh_interval_seconds == 0 {
            return Err(anyhow::anyhow!("节点缓存刷新周期必须大于0"));
        }

        if self.max_concurrent_probes == 0 {
            return Err(anyhow::anyhow!("节点探测并发数必须大于0"));
        }

        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}
