//! # Subscriber contract
//!
//! Each subscriber is driven by a dedicated worker fed by a bounded queue owned
//! by the [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ## Contract
//! - Slow subscribers do **not** block publishers nor other subscribers.
//! - On queue overflow the event is **dropped** for that subscriber and a
//!   `SubscriberOverflow` event is published.

use async_trait::async_trait;

use crate::events::Event;

/// Contract for runtime event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs and overflow events).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity; [`Config::subscriber_capacity`](crate::Config::subscriber_capacity)
    /// overrides it when set.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
