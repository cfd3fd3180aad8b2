//! 推送事件的SSE流
//!
//! 每个连接独立订阅推送通道。事件名即 `{stage}-{phase}`，
//! 订阅端落后时发出一条 `lagged` 事件，客户端应重新拉取状态。

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use pipeline_domain::{Delivery, EventChannel, EventSubscription};
use tracing::{debug, warn};

use crate::routes::AppState;

pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.services.channel.subscribe();
    debug!("新的事件流订阅");
    Sse::new(stream::unfold(subscription, next_event)).keep_alive(KeepAlive::default())
}

async fn next_event(
    mut subscription: Box<dyn EventSubscription>,
) -> Option<(Result<Event, Infallible>, Box<dyn EventSubscription>)> {
    loop {
        match subscription.next().await {
            Delivery::Event(event) => {
                let sse = match Event::default()
                    .event(event.name())
                    .id(event.event_id.to_string())
                    .json_data(&event)
                {
                    Ok(sse) => sse,
                    Err(e) => {
                        warn!(event_id = %event.event_id, "事件序列化失败: {}", e);
                        continue;
                    }
                };
                return Some((Ok(sse), subscription));
            }
            Delivery::Lagged(missed) => {
                warn!(missed, "事件流订阅端落后");
                let sse = Event::default().event("lagged").data(missed.to_string());
                return Some((Ok(sse), subscription));
            }
            Delivery::Closed => return None,
        }
    }
}
