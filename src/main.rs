use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pipeline_core::{logging, AppConfig};
use tracing::{error, info, warn};

mod app;
mod shutdown;

use app::Application;
use shutdown::{wait_for_shutdown_signal, ShutdownManager};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// 内容流水线编排服务
#[derive(Debug, Parser)]
#[command(name = "pipeline", version, about = "内容流水线编排服务")]
struct Cli {
    /// 配置文件路径，未指定时依次尝试 config/pipeline.toml 和 pipeline.toml
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short = 'l', long, value_name = "LEVEL",
          value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_name = "FORMAT", value_parser = ["json", "pretty"])]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| {
        format!(
            "加载配置失败: {}",
            cli.config.as_deref().unwrap_or("<默认路径>")
        )
    })?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.observability.log_format = format;
    }

    logging::init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;
    if config.observability.metrics_enabled {
        logging::init_metrics(&config.observability.metrics_bind_address)?;
    }

    info!("启动内容流水线编排服务");
    info!("存储: {}", config.database.url);

    let app = Application::new(config).await?;
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {:#}", e);
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("内容流水线编排服务已退出");
    Ok(())
}
