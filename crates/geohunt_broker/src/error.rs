use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    NotConnected,
    AlreadyConnected,
    QueueMissing { queue: String },
    DeliveryUnknown { queue: String, delivery_tag: u64 },
    PublishRejected { queue: String, reason: String },
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::NotConnected => write!(f, "broker connection is not open"),
            BrokerError::AlreadyConnected => write!(f, "broker connection is already open"),
            BrokerError::QueueMissing { queue } => {
                write!(f, "queue is not declared: {}", queue)
            }
            BrokerError::DeliveryUnknown {
                queue,
                delivery_tag,
            } => write!(
                f,
                "unknown delivery tag {} for queue {}",
                delivery_tag, queue
            ),
            BrokerError::PublishRejected { queue, reason } => {
                write!(f, "publish to {} rejected: {}", queue, reason)
            }
        }
    }
}

impl std::error::Error for BrokerError {}
