//! 队列排空循环
//!
//! 周期性地按优先级认领待处理任务并交给编排器执行，重试和因配额推迟的任务都靠它运行。

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pipeline_core::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::orchestrator::StageOrchestrator;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SystemAction {
    Start,
    Stop,
}

impl FromStr for SystemAction {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(SystemAction::Start),
            "stop" => Ok(SystemAction::Stop),
            _ => Err(PipelineError::validation("action", format!("未知的操作: {s}"))),
        }
    }
}

struct RunningLoop {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct DrainController {
    orchestrator: Arc<StageOrchestrator>,
    interval: Duration,
    batch_size: usize,
    running: AtomicBool,
    task: Mutex<Option<RunningLoop>>,
}

impl DrainController {
    pub fn new(orchestrator: Arc<StageOrchestrator>, interval: Duration, batch_size: usize) -> Self {
        Self {
            orchestrator,
            interval: interval.max(Duration::from_millis(10)),
            batch_size: batch_size.max(1),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 启动排空循环，已在运行时返回 false
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return false;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let orchestrator = self.orchestrator.clone();
        let batch_size = self.batch_size;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = orchestrator.drain_pending(batch_size).await {
                            error!("队列排空失败: {}", e);
                        }
                    }
                }
            }
        });

        *task = Some(RunningLoop {
            stop: stop_tx,
            handle,
        });
        self.running.store(true, Ordering::SeqCst);
        info!(
            "队列排空循环已启动: 间隔={}s, 批量={}",
            self.interval.as_secs(),
            batch_size
        );
        true
    }

    /// 停止排空循环并等待当前一轮结束，未运行时返回 false
    pub async fn stop(&self) -> bool {
        let Some(running) = self.task.lock().await.take() else {
            return false;
        };
        let _ = running.stop.send(());
        if let Err(e) = running.handle.await {
            error!("排空循环退出异常: {}", e);
        }
        self.running.store(false, Ordering::SeqCst);
        info!("队列排空循环已停止");
        true
    }

    /// 执行控制命令，返回命令后的运行状态
    pub async fn control(&self, action: SystemAction) -> PipelineResult<bool> {
        match action {
            SystemAction::Start => {
                self.start().await;
            }
            SystemAction::Stop => {
                self.stop().await;
            }
        }
        Ok(self.is_running())
    }
}
