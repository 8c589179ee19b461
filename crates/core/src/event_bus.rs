//! In-process publish/subscribe. Handlers for a topic run sequentially in
//! registration order; an individual handler's failure is logged and does
//! not prevent the rest from running or abort the publish.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use runtime_contracts::EventPayload;
use tracing::warn;

pub type EventHandler = Arc<dyn Fn(EventPayload) -> futures::future::BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: impl Into<String>, handler: EventHandler) {
        self.handlers
            .write()
            .expect("event bus lock poisoned")
            .entry(topic.into())
            .or_default()
            .push(handler);
    }

    pub async fn publish(&self, topic: &str, payload: EventPayload) {
        let handlers = self
            .handlers
            .read()
            .expect("event bus lock poisoned")
            .get(topic)
            .cloned()
            .unwrap_or_default();

        for handler in handlers {
            if let Err(e) = handler(payload.clone()).await {
                warn!(topic, error = %e, "event handler failed, continuing");
            }
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.handlers.read().expect("event bus lock poisoned").get(topic).map(|v| v.len()).unwrap_or(0)
    }
}
