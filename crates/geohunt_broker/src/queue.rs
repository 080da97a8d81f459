//! The durable-queue contract the reward pipeline is written against.

use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// A message as handed to the broker. `message_id` carries the caller-assigned
/// idempotency key; `persistent` marks the message for durable storage so it
/// survives a broker restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub payload: Vec<u8>,
    pub persistent: bool,
}

impl QueueMessage {
    pub fn persistent(message_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            message_id: message_id.into(),
            payload,
            persistent: true,
        }
    }
}

/// One delivery under manual acknowledgment. The delivery tag is only valid
/// until the delivery is acked or requeued; `redelivered` is set when the
/// message has been handed out before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDelivery {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub message: QueueMessage,
}

/// Durable-queue semantics: declare, publish, pull one message at a time under
/// manual ack, requeue on negative ack. Delivery is at-least-once; consumers
/// must dedupe on `QueueMessage::message_id`. Consumers run on their own
/// threads, so implementations are `Send + Sync`.
pub trait DurableBroker: Send + Sync {
    /// Declare a durable queue bound to the direct exchange. Idempotent.
    fn declare_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Append a message to a declared queue.
    fn publish(&self, queue: &str, message: &QueueMessage) -> Result<(), BrokerError>;

    /// Take the next message off the queue, leaving it unacknowledged.
    fn pull(&self, queue: &str) -> Result<Option<QueueDelivery>, BrokerError>;

    /// Acknowledge a delivery, removing it for good.
    fn ack(&self, queue: &str, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Negatively acknowledge a delivery, requeueing it at the head.
    fn nack_requeue(&self, queue: &str, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Requeue every unacknowledged delivery, as a dropped consumer channel
    /// does. Redelivered flags are set on everything requeued.
    fn recover(&self) -> Result<(), BrokerError>;
}

impl std::fmt::Debug for dyn DurableBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn DurableBroker")
    }
}
