use std::sync::Arc;

use crate::errors::BusError;

/// Handle returned by [`BusClient::subscribe`], used to cancel the subscription.
pub type SubscriptionId = u64;

/// A message as delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Subscriber callback. Runs on the bus-delivery thread and must return quickly.
pub type MessageHandler = Arc<dyn Fn(BusMessage) + Send + Sync>;

/// Minimal publish/subscribe contract the unit consumes.
pub trait BusClient: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<SubscriptionId, BusError>;

    /// Cancelling an unknown id is a no-op.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Key/value lookup used to discover another task's output address
/// (`<work_id>.out_port` -> bus topic).
pub trait Registry: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;

    fn insert(&self, key: &str, value: &str);

    fn remove(&self, key: &str);
}
