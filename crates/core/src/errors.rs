use thiserror::Error;

/// 同步引擎错误类型定义
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("节点不存在: {id}")]
    NodeNotFound { id: i64 },

    #[error("同步任务不存在: {id}")]
    SyncTaskNotFound { id: i64 },

    #[error("节点 {node_id} 正在同步中")]
    SyncInProgress { node_id: i64 },

    #[error("节点 {node_id} 的同步请求已在队列中")]
    SyncQueued { node_id: i64 },

    #[error("节点API错误: {0}")]
    NodeApi(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SyncError {
    /// 是否为调用方可见的同步拒绝（节点不存在、正在同步或已在队列中）
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SyncError::NodeNotFound { .. }
                | SyncError::SyncInProgress { .. }
                | SyncError::SyncQueued { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type SyncResult<T> = std::result::Result<T, SyncError>;
