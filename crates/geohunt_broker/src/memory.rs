//! In-process broker with real pull/ack/requeue semantics.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::BrokerError;
use crate::queue::{DurableBroker, QueueDelivery, QueueMessage};

#[derive(Debug, Clone)]
struct StoredMessage {
    message: QueueMessage,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, StoredMessage>,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
    next_delivery_tag: u64,
}

/// Single-process [`DurableBroker`]. Queue contents survive connection cycles;
/// only a [`InMemoryBroker::restart`] (a simulated broker crash) drops
/// non-persistent messages.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting for delivery on a queue.
    pub fn queue_depth(&self, queue: &str) -> usize {
        let state = self.inner.lock().expect("lock broker state");
        state
            .queues
            .get(queue)
            .map(|queue_state| queue_state.ready.len())
            .unwrap_or(0)
    }

    /// Deliveries handed out but neither acked nor requeued.
    pub fn unacked_count(&self, queue: &str) -> usize {
        let state = self.inner.lock().expect("lock broker state");
        state
            .queues
            .get(queue)
            .map(|queue_state| queue_state.unacked.len())
            .unwrap_or(0)
    }

    /// Simulate a broker crash and restart: unacked deliveries return to their
    /// queues, non-persistent messages are lost, persistent ones survive.
    pub fn restart(&self) {
        let mut state = self.inner.lock().expect("lock broker state");
        for queue_state in state.queues.values_mut() {
            let mut recovered: Vec<StoredMessage> = queue_state
                .unacked
                .drain()
                .map(|(_, mut stored)| {
                    stored.redelivered = true;
                    stored
                })
                .collect();
            recovered.sort_by(|left, right| left.message.message_id.cmp(&right.message.message_id));
            for stored in recovered.into_iter().rev() {
                queue_state.ready.push_front(stored);
            }
            queue_state
                .ready
                .retain(|stored| stored.message.persistent);
        }
        state.next_delivery_tag = 0;
    }
}

impl DurableBroker for InMemoryBroker {
    fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let mut state = self.inner.lock().expect("lock broker state");
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    fn publish(&self, queue: &str, message: &QueueMessage) -> Result<(), BrokerError> {
        let mut state = self.inner.lock().expect("lock broker state");
        let queue_state = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueMissing {
                queue: queue.to_string(),
            })?;
        queue_state.ready.push_back(StoredMessage {
            message: message.clone(),
            redelivered: false,
        });
        Ok(())
    }

    fn pull(&self, queue: &str) -> Result<Option<QueueDelivery>, BrokerError> {
        let mut state = self.inner.lock().expect("lock broker state");
        state.next_delivery_tag += 1;
        let delivery_tag = state.next_delivery_tag;
        let queue_state = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueMissing {
                queue: queue.to_string(),
            })?;
        let Some(stored) = queue_state.ready.pop_front() else {
            return Ok(None);
        };
        let delivery = QueueDelivery {
            delivery_tag,
            redelivered: stored.redelivered,
            message: stored.message.clone(),
        };
        queue_state.unacked.insert(delivery_tag, stored);
        Ok(Some(delivery))
    }

    fn ack(&self, queue: &str, delivery_tag: u64) -> Result<(), BrokerError> {
        let mut state = self.inner.lock().expect("lock broker state");
        let queue_state = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueMissing {
                queue: queue.to_string(),
            })?;
        queue_state
            .unacked
            .remove(&delivery_tag)
            .ok_or(BrokerError::DeliveryUnknown {
                queue: queue.to_string(),
                delivery_tag,
            })?;
        Ok(())
    }

    fn nack_requeue(&self, queue: &str, delivery_tag: u64) -> Result<(), BrokerError> {
        let mut state = self.inner.lock().expect("lock broker state");
        let queue_state = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueMissing {
                queue: queue.to_string(),
            })?;
        let mut stored =
            queue_state
                .unacked
                .remove(&delivery_tag)
                .ok_or(BrokerError::DeliveryUnknown {
                    queue: queue.to_string(),
                    delivery_tag,
                })?;
        stored.redelivered = true;
        queue_state.ready.push_front(stored);
        Ok(())
    }

    fn recover(&self) -> Result<(), BrokerError> {
        let mut state = self.inner.lock().expect("lock broker state");
        for queue_state in state.queues.values_mut() {
            let mut recovered: Vec<StoredMessage> = queue_state
                .unacked
                .drain()
                .map(|(_, mut stored)| {
                    stored.redelivered = true;
                    stored
                })
                .collect();
            recovered.sort_by(|left, right| left.message.message_id.cmp(&right.message.message_id));
            for stored in recovered.into_iter().rev() {
                queue_state.ready.push_front(stored);
            }
        }
        Ok(())
    }
}
