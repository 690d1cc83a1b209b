use async_trait::async_trait;
use std::sync::Arc;

use crate::realtime::events::Event;
use crate::realtime::registry::{ChannelId, ConnectionRegistry};

/// Outbound side of the push channel. Handlers publish through this trait so
/// a broker-backed sink can replace the in-process one.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Every open channel subscribed to the event's topic.
    async fn publish(&self, event: Event);

    /// Like `publish`, skipping the channel the event came from.
    async fn publish_except(&self, event: Event, sender: ChannelId);

    /// Only the user's channel. False when the user is offline.
    async fn send_to(&self, user_id: &str, event: Event) -> bool;
}

/// Fans events out to the channels of this process.
pub struct LocalBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl LocalBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    async fn fan_out(&self, event: Event, except: Option<ChannelId>) {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to encode event: {}", e);
                return;
            }
        };
        let delivered = self.registry.deliver(event.topic(), &frame, except).await;
        tracing::debug!("Queued {:?} event on {} channels", event.topic(), delivered);
    }
}

#[async_trait]
impl EventSink for LocalBroadcaster {
    async fn publish(&self, event: Event) {
        self.fan_out(event, None).await;
    }

    async fn publish_except(&self, event: Event, sender: ChannelId) {
        self.fan_out(event, Some(sender)).await;
    }

    async fn send_to(&self, user_id: &str, event: Event) -> bool {
        let Some(channel) = self.registry.resolve(user_id).await else {
            return false;
        };
        match event.to_frame() {
            Ok(frame) => self.registry.deliver_to(channel, &frame).await,
            Err(e) => {
                tracing::error!("Failed to encode event: {}", e);
                false
            }
        }
    }
}
