//! 节点代理 HTTP 客户端

use std::time::Duration;

use async_trait::async_trait;
use fleet_sync_core::{config::models::NodeClientConfig, SyncError, SyncResult};
use fleet_sync_domain::{
    entities::Node,
    ports::{ApiEnvelope, ApiMethod, NodeApi},
};
use reqwest::{header::CONTENT_TYPE, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "apikey";

/// 基于 reqwest 的节点接口客户端，不保存节点状态
#[derive(Clone)]
pub struct NodeApiClient {
    client: reqwest::Client,
    request_timeout: Duration,
    probe_timeout: Duration,
    health_check_timeout: Duration,
}

impl NodeApiClient {
    pub fn new(config: &NodeClientConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| SyncError::NodeApi(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            request_timeout: config.request_timeout(),
            probe_timeout: config.probe_timeout(),
            health_check_timeout: config.health_check_timeout(),
        })
    }

    fn url(node: &Node, path: &str) -> String {
        format!("{}{}", node.address.trim_end_matches('/'), path)
    }

    fn request(&self, node: &Node, method: Method, path: &str, timeout: Duration) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, Self::url(node, path))
            .timeout(timeout);
        if !node.api_key.is_empty() {
            builder = builder.header(API_KEY_HEADER, &node.api_key);
        }
        builder
    }

    fn method(method: ApiMethod) -> Method {
        match method {
            ApiMethod::Get => Method::GET,
            ApiMethod::Post => Method::POST,
            ApiMethod::Put => Method::PUT,
            ApiMethod::Delete => Method::DELETE,
        }
    }
}

#[async_trait]
impl NodeApi for NodeApiClient {
    async fn call(
        &self,
        node: &Node,
        method: ApiMethod,
        path: &str,
        body: Option<&Value>,
    ) -> ApiEnvelope {
        let mut builder = self
            .request(node, Self::method(method), path, self.request_timeout)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(node = %node.name, path, "节点请求失败: {}", e);
                return ApiEnvelope::failure(format!("请求失败: {e}"));
            }
        };

        match response.json::<ApiEnvelope>().await {
            Ok(envelope) => {
                debug!(node = %node.name, path, code = envelope.code, "节点请求完成");
                envelope
            }
            Err(e) => {
                warn!(node = %node.name, path, "节点响应解析失败: {}", e);
                ApiEnvelope::failure(format!("响应解析失败: {e}"))
            }
        }
    }

    async fn fetch_system_info(&self, node: &Node) -> SyncResult<Value> {
        let response = self
            .request(node, Method::GET, "/", self.probe_timeout)
            .send()
            .await
            .map_err(|e| SyncError::NodeApi(format!("节点 {} 连接失败: {e}", node.name)))?;

        if response.status() != StatusCode::OK {
            return Err(SyncError::NodeApi(format!(
                "节点 {} 返回状态码: {}",
                node.name,
                response.status().as_u16()
            )));
        }

        let info: Value = response
            .json()
            .await
            .map_err(|e| SyncError::NodeApi(format!("节点 {} 解析响应失败: {e}", node.name)))?;

        if !info.is_object() {
            return Err(SyncError::NodeApi(format!(
                "节点 {} 系统信息不是JSON对象",
                node.name
            )));
        }

        Ok(info)
    }

    async fn check_health(&self, node: &Node) -> SyncResult<()> {
        let response = self
            .request(node, Method::GET, "/api/check", self.health_check_timeout)
            .send()
            .await
            .map_err(|e| SyncError::NodeApi(format!("节点 {} 连接失败: {e}", node.name)))?;

        if response.status() != StatusCode::OK {
            return Err(SyncError::NodeApi(format!(
                "节点 {} 连通性检查返回状态码: {}",
                node.name,
                response.status().as_u16()
            )));
        }

        Ok(())
    }
}
