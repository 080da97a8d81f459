//! Hint unlocks paid in tokens, settled through the debit queue.

use std::sync::Arc;

use geohunt_proto::wallet::{token_debit_key, TokenDebitEvent};

use super::error::HuntError;
use super::ledger::WalletLedger;
use super::publisher::{PublishReport, WalletEventPublisher};
use super::store::HuntStore;
use crate::models::WalletKind;

pub const HINT_DEBIT_REASON: &str = "hint unlock";

/// Balance lookup against the wallet service. Deployments with a separate
/// wallet process put their transport client behind this; transport failures
/// surface as `Upstream`.
pub trait WalletRpc: Send + Sync {
    fn token_balance(&self, user_id: &str) -> Result<i64, HuntError>;
}

/// In-process adapter for deployments where the wallet ledger shares the
/// process with the hunt service.
pub struct LedgerWalletRpc {
    ledger: WalletLedger,
}

impl LedgerWalletRpc {
    pub fn new(ledger: WalletLedger) -> Self {
        Self { ledger }
    }
}

impl WalletRpc for LedgerWalletRpc {
    fn token_balance(&self, user_id: &str) -> Result<i64, HuntError> {
        Ok(self.ledger.balance(user_id, WalletKind::Token))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintUnlockOutcome {
    pub event: TokenDebitEvent,
    pub publish: PublishReport,
}

#[derive(Clone)]
pub struct HintUnlockFlow {
    store: Arc<dyn HuntStore>,
    wallet: Arc<dyn WalletRpc>,
    publisher: WalletEventPublisher,
}

impl HintUnlockFlow {
    pub fn new(
        store: Arc<dyn HuntStore>,
        wallet: Arc<dyn WalletRpc>,
        publisher: WalletEventPublisher,
    ) -> Self {
        Self {
            store,
            wallet,
            publisher,
        }
    }

    /// Charge `cost_tokens` for a clue hint. The balance check reads the
    /// wallet service; the debit itself lands asynchronously through the
    /// token-debit queue. Unlike a reward, the hint is only revealed once the
    /// debit is queued, so a terminal publish failure here is an error and
    /// the caller retries with a fresh attempt.
    pub fn unlock_hint(
        &self,
        hunt_id: &str,
        user_id: &str,
        clue_id: &str,
        cost_tokens: u64,
        now_ms: i64,
    ) -> Result<HintUnlockOutcome, HuntError> {
        if self.store.claim_for(hunt_id, user_id).is_none() {
            return Err(HuntError::NotFound {
                entity: "claim".to_string(),
                id: format!("{hunt_id}/{user_id}"),
            });
        }
        if cost_tokens == 0 {
            return Err(HuntError::Validation {
                field: "cost_tokens".to_string(),
                reason: "hint cost must be positive".to_string(),
            });
        }

        let balance = self.wallet.token_balance(user_id)?;
        let cost = i64::try_from(cost_tokens).unwrap_or(i64::MAX);
        if balance < cost {
            return Err(HuntError::Validation {
                field: "cost_tokens".to_string(),
                reason: format!("token balance {balance} does not cover the hint cost {cost_tokens}"),
            });
        }

        let event = TokenDebitEvent {
            user_id: user_id.to_string(),
            amount: cost_tokens,
            hunt_id: Some(hunt_id.to_string()),
            clue_id: Some(clue_id.to_string()),
            reason: HINT_DEBIT_REASON.to_string(),
            timestamp_ms: now_ms,
            idempotency_key: token_debit_key(user_id, clue_id, now_ms),
        };
        let publish = self.publisher.publish_debit(&event)?;
        if !publish.delivered {
            return Err(HuntError::TransientInfra {
                reason: "hint debit could not be queued".to_string(),
            });
        }
        Ok(HintUnlockOutcome { event, publish })
    }
}
