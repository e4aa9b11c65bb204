//! Template change events: in-process publish/subscribe.
//!
//! DESIGN
//! ======
//! The store accessor publishes one event per successful write so other
//! components (a playground view, a cache, the CLI) can invalidate what they
//! hold. Delivery is best-effort: slow subscribers lag and drop old events,
//! and publishing with no subscribers is not an error.

use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TemplateEvent {
    /// The collection changed in bulk; reload everything.
    TemplatesUpdated,
    TemplateCreated { id: String },
    TemplateDeleted { id: String },
    CategoryUpdated { id: String, previous: String, current: String },
    TemplatesImported { count: usize },
}

/// Cloneable handle to the event channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TemplateEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TemplateEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Returns how many received it.
    pub fn publish(&self, event: TemplateEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
