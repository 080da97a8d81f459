//! Append-only wallet ledger over the wallet store.

use std::sync::Arc;

use geohunt_proto::wallet::{RewardEvent, TokenDebitEvent};

use crate::models::{
    LedgerCategory, TransactionType, WalletKind, WalletLedgerEntry,
};

use super::audit::{AuditDraft, AuditKind, WalletAuditTrail};
use super::error::HuntError;
use super::store::{LedgerAppend, NewLedgerEntry, WalletStore};

/// Outcome of applying a queued wallet event: a fresh row, or a redelivery
/// that bounced off the event-key index and is a successful no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Inserted(WalletLedgerEntry),
    Duplicate(WalletLedgerEntry),
}

impl Applied {
    pub fn entry(&self) -> &WalletLedgerEntry {
        match self {
            Applied::Inserted(entry) | Applied::Duplicate(entry) => entry,
        }
    }
}

#[derive(Clone)]
pub struct WalletLedger {
    store: Arc<dyn WalletStore>,
    audit: WalletAuditTrail,
}

impl WalletLedger {
    pub fn new(store: Arc<dyn WalletStore>, audit: WalletAuditTrail) -> Self {
        Self { store, audit }
    }

    pub fn store(&self) -> &Arc<dyn WalletStore> {
        &self.store
    }

    /// Append one credit row. A duplicate event key here is an error, not a
    /// no-op: direct callers mint fresh keys, so a collision means a bug.
    /// Queued events go through [`WalletLedger::apply_credit_event`] instead,
    /// which treats the collision as redelivery.
    #[allow(clippy::too_many_arguments)]
    pub fn credit(
        &self,
        user_id: &str,
        wallet: WalletKind,
        amount: u64,
        category: LedgerCategory,
        description: &str,
        payment_transaction_id: Option<u64>,
        event_key: Option<String>,
        now_ms: i64,
    ) -> Result<WalletLedgerEntry, HuntError> {
        self.append_strict(NewLedgerEntry {
            user_id: user_id.to_string(),
            wallet,
            transaction_type: TransactionType::Credit,
            amount,
            category,
            payment_transaction_id,
            event_key,
            description: description.to_string(),
            created_at_ms: now_ms,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn debit(
        &self,
        user_id: &str,
        wallet: WalletKind,
        amount: u64,
        category: LedgerCategory,
        description: &str,
        payment_transaction_id: Option<u64>,
        event_key: Option<String>,
        now_ms: i64,
    ) -> Result<WalletLedgerEntry, HuntError> {
        self.append_strict(NewLedgerEntry {
            user_id: user_id.to_string(),
            wallet,
            transaction_type: TransactionType::Debit,
            amount,
            category,
            payment_transaction_id,
            event_key,
            description: description.to_string(),
            created_at_ms: now_ms,
        })
    }

    fn append_strict(&self, entry: NewLedgerEntry) -> Result<WalletLedgerEntry, HuntError> {
        match self.store.append_entry(entry)? {
            LedgerAppend::Inserted(row) => Ok(row),
            LedgerAppend::DuplicateEventKey(existing) => Err(HuntError::Conflict {
                reason: format!(
                    "event key already recorded by ledger entry {}",
                    existing.id
                ),
            }),
        }
    }

    pub fn balance(&self, user_id: &str, wallet: WalletKind) -> i64 {
        self.store.balance(user_id, wallet)
    }

    pub fn lifetime_earnings(
        &self,
        user_id: &str,
        wallet: WalletKind,
        category: LedgerCategory,
    ) -> u64 {
        self.store.lifetime_earnings(user_id, wallet, category)
    }

    /// Apply a reward event from the credit queue. The event's idempotency key
    /// is stored as the row's event key; a redelivered event dedupes into
    /// [`Applied::Duplicate`] without a second credit.
    pub fn apply_credit_event(
        &self,
        event: &RewardEvent,
        now_ms: i64,
    ) -> Result<Applied, HuntError> {
        let appended = self.store.append_entry(NewLedgerEntry {
            user_id: event.user_id.clone(),
            wallet: WalletKind::Coin,
            transaction_type: TransactionType::Credit,
            amount: event.amount,
            category: LedgerCategory::Task,
            payment_transaction_id: None,
            event_key: Some(event.idempotency_key.clone()),
            description: format!("task reward: {} ({})", event.task_name, event.hunt_name),
            created_at_ms: now_ms,
        })?;
        Ok(match appended {
            LedgerAppend::Inserted(row) => {
                self.audit.append(
                    AuditKind::CreditApplied,
                    now_ms,
                    AuditDraft::for_user(&event.user_id)
                        .with_hunt(&event.hunt_id)
                        .with_task(&event.task_id)
                        .with_amount(event.amount)
                        .with_event_key(&event.idempotency_key),
                );
                Applied::Inserted(row)
            }
            LedgerAppend::DuplicateEventKey(existing) => {
                self.audit.append(
                    AuditKind::DuplicateEventSkipped,
                    now_ms,
                    AuditDraft::for_user(&event.user_id)
                        .with_hunt(&event.hunt_id)
                        .with_task(&event.task_id)
                        .with_amount(event.amount)
                        .with_event_key(&event.idempotency_key),
                );
                Applied::Duplicate(existing)
            }
        })
    }

    /// Apply a token debit from the debit queue, same dedupe contract as
    /// [`WalletLedger::apply_credit_event`].
    pub fn apply_debit_event(
        &self,
        event: &TokenDebitEvent,
        now_ms: i64,
    ) -> Result<Applied, HuntError> {
        let appended = self.store.append_entry(NewLedgerEntry {
            user_id: event.user_id.clone(),
            wallet: WalletKind::Token,
            transaction_type: TransactionType::Debit,
            amount: event.amount,
            category: LedgerCategory::Hint,
            payment_transaction_id: None,
            event_key: Some(event.idempotency_key.clone()),
            description: event.reason.clone(),
            created_at_ms: now_ms,
        })?;
        Ok(match appended {
            LedgerAppend::Inserted(row) => {
                self.audit.append(
                    AuditKind::DebitApplied,
                    now_ms,
                    AuditDraft::for_user(&event.user_id)
                        .with_amount(event.amount)
                        .with_event_key(&event.idempotency_key),
                );
                Applied::Inserted(row)
            }
            LedgerAppend::DuplicateEventKey(existing) => {
                self.audit.append(
                    AuditKind::DuplicateEventSkipped,
                    now_ms,
                    AuditDraft::for_user(&event.user_id)
                        .with_amount(event.amount)
                        .with_event_key(&event.idempotency_key),
                );
                Applied::Duplicate(existing)
            }
        })
    }

    /// Withdraw coins against the recomputed balance; insufficient funds are a
    /// `Validation` error and nothing is written.
    pub fn create_withdrawal(
        &self,
        user_id: &str,
        coins: u64,
        now_ms: i64,
    ) -> Result<WalletLedgerEntry, HuntError> {
        let row = self.store.withdraw_if_covered(
            user_id,
            coins,
            &format!("withdrawal of {coins} coins"),
            now_ms,
        )?;
        self.audit.append(
            AuditKind::WithdrawalCreated,
            now_ms,
            AuditDraft::for_user(user_id).with_amount(coins),
        );
        Ok(row)
    }

    /// Credit the referral bonus for bringing `referred_user_id` in. Keyed so
    /// a given referral pair pays out once; a second call is a `Conflict`.
    pub fn credit_referral_bonus(
        &self,
        user_id: &str,
        amount: u64,
        referred_user_id: &str,
        now_ms: i64,
    ) -> Result<WalletLedgerEntry, HuntError> {
        self.credit(
            user_id,
            WalletKind::Coin,
            amount,
            LedgerCategory::Referral,
            &format!("referral bonus for {referred_user_id}"),
            None,
            Some(format!("referral:v1:{user_id}:{referred_user_id}")),
            now_ms,
        )
    }
}
