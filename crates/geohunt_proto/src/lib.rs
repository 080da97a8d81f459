//! Wire contracts shared by the geohunt services.
//!
//! The hunt service and the wallet service only ever talk through the types in
//! this crate: durable queue messages (reward credits, token debits), queue and
//! exchange naming conventions, and the payment-gateway webhook payload shapes.

pub mod gateway;
pub mod queues;
pub mod wallet;
pub mod wire_error;

pub use wire_error::WireError;
