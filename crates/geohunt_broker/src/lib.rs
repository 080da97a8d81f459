//! Durable-queue broker contract and in-process implementation.
//!
//! This crate defines exactly the broker semantics the reward pipeline requires:
//! durable queues on a direct exchange, persistent messages, pull-based delivery
//! under manual acknowledgment, negative-ack requeue, and redelivery flagging.
//! It is not a general message broker; a production deployment implements
//! [`DurableBroker`] over a real AMQP channel, tests and single-process setups
//! use [`InMemoryBroker`].

mod connection;
mod error;
mod memory;
mod queue;

pub use connection::BrokerConnection;
pub use error::BrokerError;
pub use memory::InMemoryBroker;
pub use queue::{DurableBroker, QueueDelivery, QueueMessage};
