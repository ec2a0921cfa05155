use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 节点API客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeClientConfig {
    /// 数据接口超时（秒）
    pub request_timeout_seconds: u64,
    /// 系统信息探测超时（秒）
    pub probe_timeout_seconds: u64,
    /// 连通性检查超时（秒）
    pub health_check_timeout_seconds: u64,
    /// 节点由运维配置信任，默认接受自签名证书
    pub accept_invalid_certs: bool,
}

impl Default for NodeClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            probe_timeout_seconds: 8,
            health_check_timeout_seconds: 10,
            accept_invalid_certs: true,
        }
    }
}

impl NodeClientConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }

        if self.probe_timeout_seconds == 0 || self.health_check_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("探测超时时间必须大于0"));
        }

        if self.probe_timeout_seconds > self.request_timeout_seconds {
            return Err(anyhow::anyhow!("探测超时时间不能大于请求超时时间"));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_seconds)
    }
}
