use async_trait::async_trait;

use crate::events::PipelineEvent;

/// 订阅端收到的一次投递
#[derive(Debug, Clone)]
pub enum Delivery {
    Event(PipelineEvent),
    /// 订阅端落后，丢失了若干事件，视同一次重连
    Lagged(u64),
    Closed,
}

/// 推送通道的发布端，至多一次投递，发布从不阻塞调用方
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: PipelineEvent);
}

#[async_trait]
pub trait EventSubscription: Send {
    async fn next(&mut self) -> Delivery;
}

/// 可订阅的推送通道
pub trait EventChannel: EventPublisher {
    fn subscribe(&self) -> Box<dyn EventSubscription>;
}
