use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pipeline_api::create_app;
use pipeline_core::{AppConfig, SystemClock};
use pipeline_dispatcher::{PipelineDependencies, PipelineServices};
use pipeline_domain::{JobRepository, ProviderConfigRepository};
use pipeline_infrastructure::{
    BroadcastEventBus, DatabaseManager, InMemoryArtifactRepository, InMemoryJobRepository,
    InMemoryProviderConfigRepository, SqliteJobRepository, SqliteProviderConfigRepository,
};
use pipeline_providers::ProviderRegistry;
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};
use tracing::{error, info, warn};

/// API服务器在关闭信号后等待存量连接（主要是事件流）的时间
const API_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// 主应用程序
pub struct Application {
    config: AppConfig,
    services: Arc<PipelineServices>,
    database: Option<DatabaseManager>,
}

impl Application {
    /// 组装仓储、提供方客户端、推送通道与调度服务
    pub async fn new(config: AppConfig) -> Result<Self> {
        let (configs, jobs, database): (
            Arc<dyn ProviderConfigRepository>,
            Arc<dyn JobRepository>,
            Option<DatabaseManager>,
        ) = if config.database.is_memory() {
            info!("使用内存仓储，重启后数据丢失");
            (
                Arc::new(InMemoryProviderConfigRepository::new()),
                Arc::new(InMemoryJobRepository::new()),
                None,
            )
        } else {
            let manager = DatabaseManager::new(&config.database).await?;
            manager.migrate().await?;
            let pool = manager.pool().clone();
            (
                Arc::new(SqliteProviderConfigRepository::new(pool.clone())),
                Arc::new(SqliteJobRepository::new(pool)),
                Some(manager),
            )
        };

        let providers =
            ProviderRegistry::with_defaults(&config.providers).context("初始化提供方客户端失败")?;
        let bus = Arc::new(BroadcastEventBus::new(config.reconciler.channel_capacity));

        let services = PipelineServices::new(
            PipelineDependencies {
                configs,
                jobs,
                artifacts: Arc::new(InMemoryArtifactRepository::new()),
                providers: Arc::new(providers),
                events: bus.clone(),
                channel: bus,
                clock: Arc::new(SystemClock),
            },
            config.ledger.clone(),
            config.reconciler.clone(),
        );

        Ok(Self {
            config,
            services: Arc::new(services),
            database,
        })
    }

    pub fn services(&self) -> &Arc<PipelineServices> {
        &self.services
    }

    /// 运行直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let reconciler_handle = tokio::spawn(
            self.services
                .reconciler
                .clone()
                .run(shutdown_rx.resubscribe()),
        );

        if self.config.ledger.autostart {
            self.services.drain.start().await;
        }

        let api_handle = if self.config.api.enabled {
            Some(self.start_api(shutdown_rx.resubscribe()).await?)
        } else {
            info!("API服务器未启用");
            None
        };

        let _ = shutdown_rx.recv().await;
        info!("应用收到关闭信号");

        self.services.drain.stop().await;

        if let Some(mut handle) = api_handle {
            if tokio::time::timeout(API_DRAIN_TIMEOUT, &mut handle).await.is_err() {
                warn!("API服务器未能在 {:?} 内关闭，强制中止", API_DRAIN_TIMEOUT);
                handle.abort();
            }
        }

        if let Err(e) = reconciler_handle.await {
            error!("事件对账器异常退出: {}", e);
        }

        if let Some(database) = &self.database {
            database.close().await;
        }

        info!("应用已停止");
        Ok(())
    }

    async fn start_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<JoinHandle<()>> {
        let bind_address = &self.config.api.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", bind_address))?;
        let app = create_app(self.services.clone(), &self.config.api);

        info!("API服务器启动在 http://{}", bind_address);

        Ok(tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            });
            if let Err(e) = server.await {
                error!("API服务器运行失败: {}", e);
            }
        }))
    }
}
