//! 基于 `tokio::sync::broadcast` 的推送通道
//!
//! 至多一次投递：没有订阅者时事件直接丢弃，订阅者落后超过容量时收到 `Lagged`。

use async_trait::async_trait;
use pipeline_domain::{Delivery, EventChannel, EventPublisher, EventSubscription, PipelineEvent};
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for BroadcastEventBus {
    fn publish(&self, event: PipelineEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            trace!("事件 {} 没有订阅者，已丢弃", name);
        }
    }
}

impl EventChannel for BroadcastEventBus {
    fn subscribe(&self) -> Box<dyn EventSubscription> {
        Box::new(BroadcastSubscription {
            receiver: self.sender.subscribe(),
        })
    }
}

pub struct BroadcastSubscription {
    receiver: broadcast::Receiver<PipelineEvent>,
}

#[async_trait]
impl EventSubscription for BroadcastSubscription {
    async fn next(&mut self) -> Delivery {
        match self.receiver.recv().await {
            Ok(event) => Delivery::Event(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => Delivery::Lagged(skipped),
            Err(broadcast::error::RecvError::Closed) => Delivery::Closed,
        }
    }
}
