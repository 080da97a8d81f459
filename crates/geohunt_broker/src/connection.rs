//! Explicit connection lifecycle in front of a [`DurableBroker`].

use std::sync::{Arc, Mutex};

use crate::error::BrokerError;
use crate::queue::DurableBroker;

/// Owns the link to a broker backend. Publishers and consumers go through
/// [`BrokerConnection::channel`] instead of holding the backend directly, so a
/// closed connection fails fast with [`BrokerError::NotConnected`] rather than
/// silently publishing into the void.
///
/// Reconnecting after a drop recovers the previous session: deliveries that
/// were pulled but never acked return to their queues marked redelivered.
pub struct BrokerConnection {
    backend: Arc<dyn DurableBroker>,
    connected: Mutex<bool>,
}

impl BrokerConnection {
    /// New connection in the closed state. Call [`BrokerConnection::connect`]
    /// before handing out channels.
    pub fn new(backend: Arc<dyn DurableBroker>) -> Self {
        Self {
            backend,
            connected: Mutex::new(false),
        }
    }

    pub fn connect(&self) -> Result<(), BrokerError> {
        let mut connected = self.connected.lock().expect("lock connection state");
        if *connected {
            return Err(BrokerError::AlreadyConnected);
        }
        // A fresh session starts by returning the previous session's unacked
        // deliveries to their queues.
        self.backend.recover()?;
        *connected = true;
        Ok(())
    }

    pub fn close(&self) -> Result<(), BrokerError> {
        let mut connected = self.connected.lock().expect("lock connection state");
        if !*connected {
            return Err(BrokerError::NotConnected);
        }
        *connected = false;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.lock().expect("lock connection state")
    }

    /// Backend handle for publishing and consuming. Errors while closed.
    pub fn channel(&self) -> Result<Arc<dyn DurableBroker>, BrokerError> {
        let connected = self.connected.lock().expect("lock connection state");
        if !*connected {
            return Err(BrokerError::NotConnected);
        }
        Ok(Arc::clone(&self.backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBroker;
    use crate::queue::QueueMessage;

    fn connected_pair() -> (Arc<InMemoryBroker>, BrokerConnection) {
        let broker = Arc::new(InMemoryBroker::new());
        let connection = BrokerConnection::new(broker.clone());
        connection.connect().expect("connect");
        (broker, connection)
    }

    #[test]
    fn channel_requires_an_open_connection() {
        let broker = Arc::new(InMemoryBroker::new());
        let connection = BrokerConnection::new(broker);
        assert!(matches!(
            connection.channel().expect_err("closed"),
            BrokerError::NotConnected
        ));

        connection.connect().expect("connect");
        assert!(connection.channel().is_ok());

        connection.close().expect("close");
        assert!(matches!(
            connection.channel().expect_err("closed again"),
            BrokerError::NotConnected
        ));
    }

    #[test]
    fn double_connect_and_double_close_are_rejected() {
        let broker = Arc::new(InMemoryBroker::new());
        let connection = BrokerConnection::new(broker);
        connection.connect().expect("connect");
        assert!(matches!(
            connection.connect().expect_err("second connect"),
            BrokerError::AlreadyConnected
        ));
        connection.close().expect("close");
        assert!(matches!(
            connection.close().expect_err("second close"),
            BrokerError::NotConnected
        ));
    }

    #[test]
    fn reconnect_returns_unacked_deliveries_to_the_queue() {
        let (broker, connection) = connected_pair();
        let channel = connection.channel().expect("channel");
        channel.declare_queue("q").expect("declare");
        channel
            .publish("q", &QueueMessage::persistent("m1", b"payload".to_vec()))
            .expect("publish");
        let _delivery = channel.pull("q").expect("pull").expect("delivery");
        assert_eq!(broker.queue_depth("q"), 0);

        // Consumer dies without acking; connection drops and comes back.
        connection.close().expect("close");
        connection.connect().expect("reconnect");

        let channel = connection.channel().expect("channel");
        let redelivery = channel.pull("q").expect("pull").expect("delivery");
        assert!(redelivery.redelivered);
        assert_eq!(redelivery.message.message_id, "m1");
    }
}
