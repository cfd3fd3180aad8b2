//! 日志与指标初始化
//!
//! 只应在二进制入口调用一次，库代码只使用 `tracing` / `metrics` 宏。

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 配额准入计数，标签 `outcome` 为 admitted / rejected
pub const METRIC_QUOTA_DECISIONS: &str = "pipeline_quota_decisions_total";
/// 任务状态转换计数，标签 `job_type`、`transition`
pub const METRIC_JOB_TRANSITIONS: &str = "pipeline_job_transitions_total";
/// 事件对账器重连次数
pub const METRIC_RECONCILER_RECONNECTS: &str = "pipeline_reconciler_reconnects_total";
/// 对账器丢弃的过期或重复事件
pub const METRIC_RECONCILER_STALE_EVENTS: &str = "pipeline_reconciler_stale_events_total";

pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 安装Prometheus指标导出器，需在tokio运行时内调用
pub fn init_metrics(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("安装Prometheus指标导出器失败: {}", e))?;

    info!("Prometheus指标导出器已启动: {}", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_log_format_rejected() {
        assert!(init_logging("info", "xml").is_err());
    }

    #[test]
    fn test_invalid_metrics_address_rejected() {
        assert!(init_metrics("not-an-address").is_err());
    }
}
