//! Durable wallet event messages.
//!
//! These messages exist only on the wire: the hunt service publishes them, the
//! wallet service consumes them into ledger rows. Delivery is at-least-once, so
//! every message carries a caller-assigned idempotency key the consumer dedupes
//! on. Keys are versioned blake3 digests over a canonical payload, in the same
//! shape for every event family.

use serde::{Deserialize, Serialize};

use crate::wire_error::WireError;

pub const REWARD_EVENT_KEY_V1_PREFIX: &str = "reward:v1:";
pub const TOKEN_DEBIT_KEY_V1_PREFIX: &str = "debit:v1:";

/// One earned task reward on its way to the coin wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEvent {
    pub user_id: String,
    pub hunt_id: String,
    pub task_id: String,
    pub amount: u64,
    pub rank: u32,
    #[serde(default)]
    pub claim_id: Option<u64>,
    pub task_name: String,
    pub hunt_name: String,
    pub timestamp_ms: i64,
    pub idempotency_key: String,
}

impl RewardEvent {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let event: RewardEvent = serde_json::from_slice(bytes)?;
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), WireError> {
        if self.user_id.trim().is_empty() {
            return Err(WireError::Invalid {
                reason: "reward event user_id cannot be empty".to_string(),
            });
        }
        if self.hunt_id.trim().is_empty() || self.task_id.trim().is_empty() {
            return Err(WireError::Invalid {
                reason: "reward event hunt_id and task_id cannot be empty".to_string(),
            });
        }
        if self.amount == 0 {
            return Err(WireError::Invalid {
                reason: "reward event amount must be positive".to_string(),
            });
        }
        if self.rank == 0 {
            return Err(WireError::Invalid {
                reason: "reward event rank is 1-based and cannot be zero".to_string(),
            });
        }
        if self.idempotency_key.trim().is_empty() {
            return Err(WireError::Invalid {
                reason: "reward event idempotency_key cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// One token spend (hint/clue unlock) on its way to the token wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDebitEvent {
    pub user_id: String,
    pub amount: u64,
    #[serde(default)]
    pub hunt_id: Option<String>,
    #[serde(default)]
    pub clue_id: Option<String>,
    pub reason: String,
    pub timestamp_ms: i64,
    pub idempotency_key: String,
}

impl TokenDebitEvent {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let event: TokenDebitEvent = serde_json::from_slice(bytes)?;
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), WireError> {
        if self.user_id.trim().is_empty() {
            return Err(WireError::Invalid {
                reason: "token debit user_id cannot be empty".to_string(),
            });
        }
        if self.amount == 0 {
            return Err(WireError::Invalid {
                reason: "token debit amount must be positive".to_string(),
            });
        }
        if self.idempotency_key.trim().is_empty() {
            return Err(WireError::Invalid {
                reason: "token debit idempotency_key cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Derive the idempotency key for a reward credit.
pub fn reward_event_key(
    user_id: &str,
    hunt_id: &str,
    task_id: &str,
    timestamp_ms: i64,
) -> String {
    let payload = format!("reward:v1|{user_id}|{hunt_id}|{task_id}|{timestamp_ms}");
    format!(
        "{REWARD_EVENT_KEY_V1_PREFIX}{}",
        blake3_hex(payload.as_bytes())
    )
}

/// Derive the idempotency key for a token debit. `reference` is whatever makes
/// the spend unique for the user, typically the clue id.
pub fn token_debit_key(user_id: &str, reference: &str, timestamp_ms: i64) -> String {
    let payload = format!("debit:v1|{user_id}|{reference}|{timestamp_ms}");
    format!(
        "{TOKEN_DEBIT_KEY_V1_PREFIX}{}",
        blake3_hex(payload.as_bytes())
    )
}

fn blake3_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
