use std::sync::Arc;

use anyhow::{Context, Result};
use fleet_sync_core::AppConfig;
use fleet_sync_engine::{EngineDependencies, SyncEngine};
use fleet_sync_infrastructure::{
    database::DatabaseManager,
    node_client::NodeApiClient,
    observability::{install_prometheus_exporter, SyncMetrics},
};
use tokio::sync::broadcast;
use tracing::{error, info};

/// 主应用程序
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    engine: Arc<SyncEngine>,
}

impl Application {
    /// 连接数据库、执行迁移并组装同步引擎
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序");

        if config.observability.metrics_enabled {
            install_prometheus_exporter(&config.observability.metrics_bind_address)?;
        }

        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        database.migrate().await.context("执行数据库迁移失败")?;

        let node_api = NodeApiClient::new(&config.node_client).context("创建节点客户端失败")?;

        let deps = EngineDependencies {
            node_repo: database.node_repository(),
            container_repo: database.container_cache_repository(),
            task_repo: database.sync_task_repository(),
            info_repo: database.node_info_cache_repository(),
            node_api: Arc::new(node_api),
        };
        let engine = SyncEngine::new(
            deps,
            config.sync.clone(),
            &config.node_cache,
            SyncMetrics::new(),
        );
        engine
            .recover_unfinished_tasks()
            .await
            .context("清理未结束的同步任务失败")?;

        Ok(Self {
            config,
            database,
            engine: Arc::new(engine),
        })
    }

    pub fn engine(&self) -> Arc<SyncEngine> {
        Arc::clone(&self.engine)
    }

    /// 运行后台组件，直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动所有组件");

        let mut handles = Vec::new();

        {
            let engine = Arc::clone(&self.engine);
            let shutdown_rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                if let Err(e) = engine.run_queue(shutdown_rx).await {
                    error!("同步任务队列运行失败: {}", e);
                }
            }));
        }

        if self.config.node_cache.enabled {
            let engine = Arc::clone(&self.engine);
            let shutdown_rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                engine.run_node_cache(shutdown_rx).await;
            }));
        }

        if self.config.sync.auto_sync_enabled {
            self.engine.enable_auto_sync();
        }

        for handle in handles {
            let _ = handle.await;
        }

        self.engine.disable_auto_sync();
        self.database.close().await;

        info!("所有组件已停止");
        Ok(())
    }
}
