//! Durable event publishing with retry.
//!
//! The publisher is best-effort forwarding of state that is already committed:
//! a terminal publish failure is audited and reported, never turned into a
//! rollback of the completion that produced the event.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use geohunt_broker::{BrokerConnection, QueueMessage};
use geohunt_proto::queues;
use geohunt_proto::wallet::{RewardEvent, TokenDebitEvent};

use super::audit::{AuditDraft, AuditKind, WalletAuditTrail};
use super::error::HuntError;

pub const DEFAULT_PUBLISH_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_PUBLISH_BASE_DELAY_MS: u64 = 100;

/// Exponential backoff: the delay before attempt n+1 is `base_delay_ms`
/// doubled per failed attempt, with a fixed attempt cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for PublishRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_PUBLISH_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_PUBLISH_BASE_DELAY_MS,
        }
    }
}

impl PublishRetryPolicy {
    pub fn validate(&self) -> Result<(), HuntError> {
        if self.max_attempts == 0 {
            return Err(HuntError::Validation {
                field: "max_attempts".to_string(),
                reason: "publish retry needs at least one attempt".to_string(),
            });
        }
        Ok(())
    }

    /// Delay before the given 1-based attempt; attempt 1 runs immediately.
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let doublings = (attempt - 2).min(20);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << doublings))
    }
}

/// What happened to one publish call, attempt by attempt. `delivered: false`
/// after `attempts == max_attempts` is the terminal failure case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub queue: String,
    pub message_id: String,
    pub delivered: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct WalletEventPublisher {
    connection: Arc<BrokerConnection>,
    env_id: String,
    policy: PublishRetryPolicy,
    audit: WalletAuditTrail,
}

impl WalletEventPublisher {
    pub fn new(
        connection: Arc<BrokerConnection>,
        env_id: impl Into<String>,
        audit: WalletAuditTrail,
    ) -> Self {
        Self {
            connection,
            env_id: env_id.into(),
            policy: PublishRetryPolicy::default(),
            audit,
        }
    }

    pub fn with_policy(
        connection: Arc<BrokerConnection>,
        env_id: impl Into<String>,
        audit: WalletAuditTrail,
        policy: PublishRetryPolicy,
    ) -> Result<Self, HuntError> {
        policy.validate()?;
        Ok(Self {
            connection,
            env_id: env_id.into(),
            policy,
            audit,
        })
    }

    pub fn reward_queue(&self) -> String {
        queues::queue_reward_credit(&self.env_id)
    }

    pub fn debit_queue(&self) -> String {
        queues::queue_token_debit(&self.env_id)
    }

    /// Declare both wallet queues on the current channel. Callers run this
    /// once after connecting.
    pub fn declare_queues(&self) -> Result<(), HuntError> {
        let channel = self.connection.channel()?;
        channel.declare_queue(&self.reward_queue())?;
        channel.declare_queue(&self.debit_queue())?;
        Ok(())
    }

    /// Publish a reward credit event. Returns `Err` only when the event itself
    /// is unsendable (fails validation or encoding); broker trouble is retried
    /// and, if it sticks, reported via `delivered: false`.
    pub fn publish_reward(&self, event: &RewardEvent) -> Result<PublishReport, HuntError> {
        event.validate().map_err(HuntError::from)?;
        let payload = event.to_json_bytes().map_err(HuntError::from)?;
        let message = QueueMessage::persistent(event.idempotency_key.clone(), payload);
        let context = AuditDraft::for_user(&event.user_id)
            .with_hunt(&event.hunt_id)
            .with_task(&event.task_id)
            .with_amount(event.amount)
            .with_event_key(&event.idempotency_key);
        Ok(self.publish_with_retry(self.reward_queue(), message, context, event.timestamp_ms))
    }

    /// Publish a token debit event; same contract as
    /// [`WalletEventPublisher::publish_reward`].
    pub fn publish_debit(&self, event: &TokenDebitEvent) -> Result<PublishReport, HuntError> {
        event.validate().map_err(HuntError::from)?;
        let payload = event.to_json_bytes().map_err(HuntError::from)?;
        let message = QueueMessage::persistent(event.idempotency_key.clone(), payload);
        let mut context = AuditDraft::for_user(&event.user_id)
            .with_amount(event.amount)
            .with_event_key(&event.idempotency_key);
        if let Some(hunt_id) = &event.hunt_id {
            context = context.with_hunt(hunt_id);
        }
        Ok(self.publish_with_retry(self.debit_queue(), message, context, event.timestamp_ms))
    }

    fn publish_with_retry(
        &self,
        queue: String,
        message: QueueMessage,
        context: AuditDraft,
        at_ms: i64,
    ) -> PublishReport {
        let mut last_error: Option<String> = None;
        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.delay_before_attempt(attempt);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            let result = self
                .connection
                .channel()
                .and_then(|channel| channel.publish(&queue, &message));
            match result {
                Ok(()) => {
                    return PublishReport {
                        queue,
                        message_id: message.message_id,
                        delivered: true,
                        attempts: attempt,
                        last_error,
                    };
                }
                Err(err) => {
                    let detail = err.to_string();
                    self.audit.append(
                        AuditKind::PublishAttemptFailed,
                        at_ms,
                        context
                            .clone()
                            .with_detail(format!("attempt {attempt}: {detail}")),
                    );
                    last_error = Some(detail);
                }
            }
        }
        self.audit.append(
            AuditKind::PublishTerminalFailure,
            at_ms,
            context.with_detail(format!(
                "gave up after {} attempts: {}",
                self.policy.max_attempts,
                last_error.as_deref().unwrap_or("unknown error")
            )),
        );
        PublishReport {
            queue,
            message_id: message.message_id,
            delivered: false,
            attempts: self.policy.max_attempts,
            last_error,
        }
    }
}
