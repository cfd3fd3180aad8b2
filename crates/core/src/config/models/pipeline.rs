use serde::{Deserialize, Serialize};

/// 任务账本与队列排空循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub default_max_retries: u32,
    pub default_priority: i32,
    pub drain_interval_seconds: u64,
    pub drain_batch_size: usize,
    pub autostart: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            default_priority: 5,
            drain_interval_seconds: 10,
            drain_batch_size: 20,
            autostart: true,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.drain_interval_seconds == 0 {
            return Err(anyhow::anyhow!("队列排空间隔必须大于0"));
        }

        if self.drain_batch_size == 0 {
            return Err(anyhow::anyhow!("单次排空任务数必须大于0"));
        }

        Ok(())
    }
}

/// 事件对账器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub poll_interval_seconds: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub channel_capacity: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            channel_capacity: 1024,
        }
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("对账轮询间隔必须大于0"));
        }

        if self.reconnect_base_delay_ms == 0 {
            return Err(anyhow::anyhow!("重连基础延迟必须大于0"));
        }

        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(anyhow::anyhow!("重连最大延迟不能小于基础延迟"));
        }

        if self.channel_capacity == 0 {
            return Err(anyhow::anyhow!("事件通道容量必须大于0"));
        }

        Ok(())
    }
}

/// 外部提供方调用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub request_timeout_seconds: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 60,
        }
    }
}

impl ProvidersConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("提供方请求超时时间必须大于0"));
        }
        Ok(())
    }
}
