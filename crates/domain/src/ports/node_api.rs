use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::Node;
use fleet_sync_core::SyncResult;

/// 节点接口成功响应码
pub const API_SUCCESS_CODE: i64 = 200;
/// 调用失败时合成响应使用的错误码
pub const API_FAILURE_CODE: i64 = 500;

/// 节点接口统一响应 `{code, msg, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

impl ApiEnvelope {
    pub fn success(data: Value) -> Self {
        Self {
            code: API_SUCCESS_CODE,
            msg: "success".to_string(),
            data,
        }
    }

    /// 传输或解析失败时的合成响应
    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            code: API_FAILURE_CODE,
            msg: msg.into(),
            data: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == API_SUCCESS_CODE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl ApiMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::Get => "GET",
            ApiMethod::Post => "POST",
            ApiMethod::Put => "PUT",
            ApiMethod::Delete => "DELETE",
        }
    }
}

/// 节点代理的 HTTP 接口
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// 调用节点接口，任何失败都返回非 200 的合成响应而不是错误
    async fn call(
        &self,
        node: &Node,
        method: ApiMethod,
        path: &str,
        body: Option<&Value>,
    ) -> ApiEnvelope;

    /// 探测节点根路径 `/`，返回系统信息 JSON 对象
    async fn fetch_system_info(&self, node: &Node) -> SyncResult<Value>;

    /// 连通性检查 `/api/check`，HTTP 200 视为成功
    async fn check_health(&self, node: &Node) -> SyncResult<()>;
}
