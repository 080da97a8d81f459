//! Store traits and in-memory implementations.
//!
//! Each store is one mutex around owned state, and every method that must be
//! atomic (count-then-insert for ranks, check-then-debit for withdrawals,
//! check-then-transition for payments) does its whole unit of work under a
//! single lock acquisition. That lock is the stand-in for a serializable
//! database transaction; a persistent implementation must provide the same
//! atomicity plus the two unique indexes: (user_id, hunt_id) on claims and
//! the stored event key on ledger entries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use crate::models::{
    ClaimStatus, CompletedTask, Hunt, HuntClaim, HuntTask, LedgerCategory, PaymentStatus,
    PaymentTransaction, PaymentType, RewardTier, TransactionType, WalletKind, WalletLedgerEntry,
};

use super::error::HuntError;
use super::rewards::reward_for_rank;

pub trait HuntStore: Send + Sync {
    fn upsert_hunt(&self, hunt: Hunt);
    fn upsert_task(&self, task: HuntTask);
    fn hunt(&self, hunt_id: &str) -> Option<Hunt>;
    fn task(&self, task_id: &str) -> Option<HuntTask>;
    fn hunts_in_zone(&self, zone_id: &str) -> Vec<Hunt>;

    /// Insert a fresh claim in `claimed` status. Enforces the unique
    /// (user_id, hunt_id) index; a second claim is a `Conflict`.
    fn insert_claim(
        &self,
        user_id: &str,
        hunt_id: &str,
        now_ms: i64,
        expire_at_ms: i64,
    ) -> Result<HuntClaim, HuntError>;
    fn claim_for(&self, hunt_id: &str, user_id: &str) -> Option<HuntClaim>;
    fn claimed_hunt_ids(&self, user_id: &str) -> BTreeSet<String>;

    /// Apply a caller-requested status edge. Only the forward edges allowed by
    /// [`ClaimStatus::can_advance_to`] pass; anything else is a `Conflict`.
    fn advance_claim(
        &self,
        hunt_id: &str,
        user_id: &str,
        to: ClaimStatus,
    ) -> Result<HuntClaim, HuntError>;

    /// Mark a claim completed, stamping `completed_at_ms`. Idempotent: a claim
    /// that is already completed is returned unchanged, so two final-task
    /// completions racing each other both succeed.
    fn complete_claim(
        &self,
        hunt_id: &str,
        user_id: &str,
        now_ms: i64,
    ) -> Result<HuntClaim, HuntError>;

    /// Assign the next rank for (hunt_id, task_id) and insert the completion,
    /// all under one lock: rank = prior ranked completions + 1, reward from
    /// the tier table. The unique (hunt_id, task_id, user_id) index rejects a
    /// duplicate completion with `Conflict`.
    fn insert_ranked_completion(
        &self,
        hunt_id: &str,
        task_id: &str,
        user_id: &str,
        claim_id: Option<u64>,
        tiers: &[RewardTier],
        now_ms: i64,
    ) -> Result<CompletedTask, HuntError>;

    /// Record a completion that did not qualify for a ranked reward (failed
    /// quiz, untiered task). Never reads the rank counter, so failed attempts
    /// never consume a reward slot.
    fn insert_unranked_completion(
        &self,
        hunt_id: &str,
        task_id: &str,
        user_id: &str,
        claim_id: Option<u64>,
        now_ms: i64,
    ) -> Result<CompletedTask, HuntError>;

    fn completion_for(&self, hunt_id: &str, task_id: &str, user_id: &str)
        -> Option<CompletedTask>;
    fn completions_for_task(&self, hunt_id: &str, task_id: &str) -> Vec<CompletedTask>;
    fn completed_task_ids(&self, hunt_id: &str, user_id: &str) -> BTreeSet<String>;
    fn completions(&self) -> Vec<CompletedTask>;
}

#[derive(Debug, Default)]
struct HuntState {
    hunts: BTreeMap<String, Hunt>,
    tasks: BTreeMap<String, HuntTask>,
    claims: Vec<HuntClaim>,
    completions: Vec<CompletedTask>,
    next_claim_id: u64,
    next_completion_id: u64,
}

#[derive(Clone, Default)]
pub struct InMemoryHuntStore {
    inner: Arc<Mutex<HuntState>>,
}

impl InMemoryHuntStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HuntStore for InMemoryHuntStore {
    fn upsert_hunt(&self, hunt: Hunt) {
        let mut state = self.inner.lock().expect("lock hunt store");
        state.hunts.insert(hunt.hunt_id.clone(), hunt);
    }

    fn upsert_task(&self, task: HuntTask) {
        let mut state = self.inner.lock().expect("lock hunt store");
        let mut task = task;
        // The reward scan walks tiers cumulatively; keep them ordered on the
        // way in so a scrambled admin payload cannot reorder buckets.
        task.tiers.sort_by_key(|tier| tier.level);
        state.tasks.insert(task.task_id.clone(), task);
    }

    fn hunt(&self, hunt_id: &str) -> Option<Hunt> {
        let state = self.inner.lock().expect("lock hunt store");
        state.hunts.get(hunt_id).cloned()
    }

    fn task(&self, task_id: &str) -> Option<HuntTask> {
        let state = self.inner.lock().expect("lock hunt store");
        state.tasks.get(task_id).cloned()
    }

    fn hunts_in_zone(&self, zone_id: &str) -> Vec<Hunt> {
        let state = self.inner.lock().expect("lock hunt store");
        state
            .hunts
            .values()
            .filter(|hunt| hunt.zone_id == zone_id)
            .cloned()
            .collect()
    }

    fn insert_claim(
        &self,
        user_id: &str,
        hunt_id: &str,
        now_ms: i64,
        expire_at_ms: i64,
    ) -> Result<HuntClaim, HuntError> {
        let mut state = self.inner.lock().expect("lock hunt store");
        let duplicate = state
            .claims
            .iter()
            .any(|claim| claim.user_id == user_id && claim.hunt_id == hunt_id);
        if duplicate {
            return Err(HuntError::Conflict {
                reason: format!("hunt {hunt_id} is already claimed by user {user_id}"),
            });
        }
        state.next_claim_id += 1;
        let claim = HuntClaim {
            id: state.next_claim_id,
            user_id: user_id.to_string(),
            hunt_id: hunt_id.to_string(),
            status: ClaimStatus::Claimed,
            claimed_at_ms: now_ms,
            expire_at_ms,
            completed_at_ms: None,
        };
        state.claims.push(claim.clone());
        Ok(claim)
    }

    fn claim_for(&self, hunt_id: &str, user_id: &str) -> Option<HuntClaim> {
        let state = self.inner.lock().expect("lock hunt store");
        state
            .claims
            .iter()
            .find(|claim| claim.hunt_id == hunt_id && claim.user_id == user_id)
            .cloned()
    }

    fn claimed_hunt_ids(&self, user_id: &str) -> BTreeSet<String> {
        let state = self.inner.lock().expect("lock hunt store");
        state
            .claims
            .iter()
            .filter(|claim| claim.user_id == user_id)
            .map(|claim| claim.hunt_id.clone())
            .collect()
    }

    fn advance_claim(
        &self,
        hunt_id: &str,
        user_id: &str,
        to: ClaimStatus,
    ) -> Result<HuntClaim, HuntError> {
        let mut state = self.inner.lock().expect("lock hunt store");
        let claim = state
            .claims
            .iter_mut()
            .find(|claim| claim.hunt_id == hunt_id && claim.user_id == user_id)
            .ok_or_else(|| HuntError::NotFound {
                entity: "claim".to_string(),
                id: format!("{hunt_id}/{user_id}"),
            })?;
        if !claim.status.can_advance_to(to) {
            return Err(HuntError::Conflict {
                reason: format!(
                    "claim cannot advance from {} to {}",
                    claim.status.as_str(),
                    to.as_str()
                ),
            });
        }
        claim.status = to;
        Ok(claim.clone())
    }

    fn complete_claim(
        &self,
        hunt_id: &str,
        user_id: &str,
        now_ms: i64,
    ) -> Result<HuntClaim, HuntError> {
        let mut state = self.inner.lock().expect("lock hunt store");
        let claim = state
            .claims
            .iter_mut()
            .find(|claim| claim.hunt_id == hunt_id && claim.user_id == user_id)
            .ok_or_else(|| HuntError::NotFound {
                entity: "claim".to_string(),
                id: format!("{hunt_id}/{user_id}"),
            })?;
        if claim.status != ClaimStatus::Completed {
            claim.status = ClaimStatus::Completed;
            claim.completed_at_ms = Some(now_ms);
        }
        Ok(claim.clone())
    }

    fn insert_ranked_completion(
        &self,
        hunt_id: &str,
        task_id: &str,
        user_id: &str,
        claim_id: Option<u64>,
        tiers: &[RewardTier],
        now_ms: i64,
    ) -> Result<CompletedTask, HuntError> {
        let mut state = self.inner.lock().expect("lock hunt store");
        check_unique_completion(&state.completions, hunt_id, task_id, user_id)?;
        let prior_ranked = state
            .completions
            .iter()
            .filter(|row| row.hunt_id == hunt_id && row.task_id == task_id && row.rank.is_some())
            .count() as u32;
        let rank = prior_ranked + 1;
        let reward = reward_for_rank(tiers, rank);
        state.next_completion_id += 1;
        let completion = CompletedTask {
            id: state.next_completion_id,
            hunt_id: hunt_id.to_string(),
            task_id: task_id.to_string(),
            user_id: user_id.to_string(),
            claim_id,
            rank: Some(rank),
            reward,
            completed_at_ms: now_ms,
        };
        state.completions.push(completion.clone());
        Ok(completion)
    }

    fn insert_unranked_completion(
        &self,
        hunt_id: &str,
        task_id: &str,
        user_id: &str,
        claim_id: Option<u64>,
        now_ms: i64,
    ) -> Result<CompletedTask, HuntError> {
        let mut state = self.inner.lock().expect("lock hunt store");
        check_unique_completion(&state.completions, hunt_id, task_id, user_id)?;
        state.next_completion_id += 1;
        let completion = CompletedTask {
            id: state.next_completion_id,
            hunt_id: hunt_id.to_string(),
            task_id: task_id.to_string(),
            user_id: user_id.to_string(),
            claim_id,
            rank: None,
            reward: 0,
            completed_at_ms: now_ms,
        };
        state.completions.push(completion.clone());
        Ok(completion)
    }

    fn completion_for(
        &self,
        hunt_id: &str,
        task_id: &str,
        user_id: &str,
    ) -> Option<CompletedTask> {
        let state = self.inner.lock().expect("lock hunt store");
        state
            .completions
            .iter()
            .find(|row| {
                row.hunt_id == hunt_id && row.task_id == task_id && row.user_id == user_id
            })
            .cloned()
    }

    fn completions_for_task(&self, hunt_id: &str, task_id: &str) -> Vec<CompletedTask> {
        let state = self.inner.lock().expect("lock hunt store");
        state
            .completions
            .iter()
            .filter(|row| row.hunt_id == hunt_id && row.task_id == task_id)
            .cloned()
            .collect()
    }

    fn completed_task_ids(&self, hunt_id: &str, user_id: &str) -> BTreeSet<String> {
        let state = self.inner.lock().expect("lock hunt store");
        state
            .completions
            .iter()
            .filter(|row| row.hunt_id == hunt_id && row.user_id == user_id)
            .map(|row| row.task_id.clone())
            .collect()
    }

    fn completions(&self) -> Vec<CompletedTask> {
        let state = self.inner.lock().expect("lock hunt store");
        state.completions.clone()
    }
}

fn check_unique_completion(
    completions: &[CompletedTask],
    hunt_id: &str,
    task_id: &str,
    user_id: &str,
) -> Result<(), HuntError> {
    let duplicate = completions
        .iter()
        .any(|row| row.hunt_id == hunt_id && row.task_id == task_id && row.user_id == user_id);
    if duplicate {
        return Err(HuntError::Conflict {
            reason: format!("task {task_id} already completed by user {user_id}"),
        });
    }
    Ok(())
}

/// A ledger row before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub user_id: String,
    pub wallet: WalletKind,
    pub transaction_type: TransactionType,
    pub amount: u64,
    pub category: LedgerCategory,
    pub payment_transaction_id: Option<u64>,
    pub event_key: Option<String>,
    pub description: String,
    pub created_at_ms: i64,
}

/// Result of an append: inserted, or bounced off the event-key unique index.
/// The duplicate case carries the row that already holds the key, so callers
/// can treat redelivery as a successful no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerAppend {
    Inserted(WalletLedgerEntry),
    DuplicateEventKey(WalletLedgerEntry),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentTransaction {
    pub user_id: String,
    pub amount: u64,
    pub currency: String,
    pub quantity: u64,
    pub payment_type: PaymentType,
    pub gateway: String,
    pub gateway_order_id: String,
    pub metadata: BTreeMap<String, String>,
    pub created_at_ms: i64,
}

/// Result of driving a payment row toward a terminal status. A row that is
/// already terminal never transitions again; the existing row comes back so
/// webhook replays can be answered as no-ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentTransition {
    Applied(PaymentTransaction),
    AlreadyTerminal(PaymentTransaction),
}

pub trait WalletStore: Send + Sync {
    /// Append one row. Zero amounts and empty user ids are `Validation`
    /// errors; a present `event_key` already held by another row returns
    /// `LedgerAppend::DuplicateEventKey` instead of inserting.
    fn append_entry(&self, entry: NewLedgerEntry) -> Result<LedgerAppend, HuntError>;

    /// Balance-check and debit in one unit of work: the coin balance is
    /// recomputed and, only if it covers `coins`, a withdrawal debit row is
    /// appended under the same lock.
    fn withdraw_if_covered(
        &self,
        user_id: &str,
        coins: u64,
        description: &str,
        now_ms: i64,
    ) -> Result<WalletLedgerEntry, HuntError>;

    fn entries_for(&self, user_id: &str) -> Vec<WalletLedgerEntry>;
    fn entries(&self) -> Vec<WalletLedgerEntry>;

    /// Σcredits − Σdebits over the user's rows in one wallet. Always
    /// recomputed; nothing caches this.
    fn balance(&self, user_id: &str, wallet: WalletKind) -> i64;

    /// Sum of credits (only) in one category, e.g. task rewards earned all
    /// time regardless of later spending.
    fn lifetime_earnings(
        &self,
        user_id: &str,
        wallet: WalletKind,
        category: LedgerCategory,
    ) -> u64;

    /// Create a pending payment row. `gateway_order_id` is unique; a repeat is
    /// a `Conflict`.
    fn insert_payment(
        &self,
        payment: NewPaymentTransaction,
    ) -> Result<PaymentTransaction, HuntError>;
    fn payment_by_order_id(&self, gateway_order_id: &str) -> Option<PaymentTransaction>;

    /// Drive `pending` to a terminal status under one lock. Unknown order ids
    /// are `NotFound`; terminal rows come back as `AlreadyTerminal` unchanged.
    fn transition_payment(
        &self,
        gateway_order_id: &str,
        to: PaymentStatus,
        gateway_payment_id: Option<String>,
        now_ms: i64,
    ) -> Result<PaymentTransition, HuntError>;
}

#[derive(Debug, Default)]
struct WalletState {
    entries: Vec<WalletLedgerEntry>,
    event_key_index: BTreeMap<String, usize>,
    payments: Vec<PaymentTransaction>,
    next_entry_id: u64,
    next_payment_id: u64,
}

impl WalletState {
    fn balance_of(&self, user_id: &str, wallet: WalletKind) -> i64 {
        self.entries
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.wallet == wallet)
            .map(WalletLedgerEntry::signed_amount)
            .sum()
    }

    fn append(&mut self, entry: NewLedgerEntry) -> Result<LedgerAppend, HuntError> {
        if entry.user_id.trim().is_empty() {
            return Err(HuntError::Validation {
                field: "user_id".to_string(),
                reason: "user_id cannot be empty".to_string(),
            });
        }
        if entry.amount == 0 {
            return Err(HuntError::Validation {
                field: "amount".to_string(),
                reason: "ledger amounts must be positive".to_string(),
            });
        }
        if let Some(event_key) = &entry.event_key {
            if let Some(&existing_idx) = self.event_key_index.get(event_key) {
                return Ok(LedgerAppend::DuplicateEventKey(
                    self.entries[existing_idx].clone(),
                ));
            }
        }
        self.next_entry_id += 1;
        let row = WalletLedgerEntry {
            id: self.next_entry_id,
            user_id: entry.user_id,
            wallet: entry.wallet,
            transaction_type: entry.transaction_type,
            amount: entry.amount,
            category: entry.category,
            payment_transaction_id: entry.payment_transaction_id,
            event_key: entry.event_key,
            description: entry.description,
            created_at_ms: entry.created_at_ms,
        };
        if let Some(event_key) = &row.event_key {
            self.event_key_index
                .insert(event_key.clone(), self.entries.len());
        }
        self.entries.push(row.clone());
        Ok(LedgerAppend::Inserted(row))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryWalletStore {
    inner: Arc<Mutex<WalletState>>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WalletStore for InMemoryWalletStore {
    fn append_entry(&self, entry: NewLedgerEntry) -> Result<LedgerAppend, HuntError> {
        let mut state = self.inner.lock().expect("lock wallet store");
        state.append(entry)
    }

    fn withdraw_if_covered(
        &self,
        user_id: &str,
        coins: u64,
        description: &str,
        now_ms: i64,
    ) -> Result<WalletLedgerEntry, HuntError> {
        let mut state = self.inner.lock().expect("lock wallet store");
        if coins == 0 {
            return Err(HuntError::Validation {
                field: "coins".to_string(),
                reason: "withdrawal amount must be positive".to_string(),
            });
        }
        let balance = state.balance_of(user_id, WalletKind::Coin);
        if balance < i64::try_from(coins).unwrap_or(i64::MAX) {
            return Err(HuntError::Validation {
                field: "coins".to_string(),
                reason: format!("insufficient coin balance: have {balance}, need {coins}"),
            });
        }
        match state.append(NewLedgerEntry {
            user_id: user_id.to_string(),
            wallet: WalletKind::Coin,
            transaction_type: TransactionType::Debit,
            amount: coins,
            category: LedgerCategory::Withdrawal,
            payment_transaction_id: None,
            event_key: None,
            description: description.to_string(),
            created_at_ms: now_ms,
        })? {
            LedgerAppend::Inserted(row) => Ok(row),
            LedgerAppend::DuplicateEventKey(_) => Err(HuntError::FatalInvariant {
                reason: "withdrawal rows carry no event key".to_string(),
            }),
        }
    }

    fn entries_for(&self, user_id: &str) -> Vec<WalletLedgerEntry> {
        let state = self.inner.lock().expect("lock wallet store");
        state
            .entries
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect()
    }

    fn entries(&self) -> Vec<WalletLedgerEntry> {
        let state = self.inner.lock().expect("lock wallet store");
        state.entries.clone()
    }

    fn balance(&self, user_id: &str, wallet: WalletKind) -> i64 {
        let state = self.inner.lock().expect("lock wallet store");
        state.balance_of(user_id, wallet)
    }

    fn lifetime_earnings(
        &self,
        user_id: &str,
        wallet: WalletKind,
        category: LedgerCategory,
    ) -> u64 {
        let state = self.inner.lock().expect("lock wallet store");
        state
            .entries
            .iter()
            .filter(|entry| {
                entry.user_id == user_id
                    && entry.wallet == wallet
                    && entry.category == category
                    && entry.transaction_type == TransactionType::Credit
            })
            .map(|entry| entry.amount)
            .sum()
    }

    fn insert_payment(
        &self,
        payment: NewPaymentTransaction,
    ) -> Result<PaymentTransaction, HuntError> {
        let mut state = self.inner.lock().expect("lock wallet store");
        let duplicate = state
            .payments
            .iter()
            .any(|row| row.gateway_order_id == payment.gateway_order_id);
        if duplicate {
            return Err(HuntError::Conflict {
                reason: format!(
                    "payment session already exists for order {}",
                    payment.gateway_order_id
                ),
            });
        }
        state.next_payment_id += 1;
        let row = PaymentTransaction {
            id: state.next_payment_id,
            user_id: payment.user_id,
            amount: payment.amount,
            currency: payment.currency,
            quantity: payment.quantity,
            payment_type: payment.payment_type,
            gateway: payment.gateway,
            gateway_order_id: payment.gateway_order_id,
            gateway_payment_id: None,
            status: PaymentStatus::Pending,
            metadata: payment.metadata,
            created_at_ms: payment.created_at_ms,
            updated_at_ms: payment.created_at_ms,
        };
        state.payments.push(row.clone());
        Ok(row)
    }

    fn payment_by_order_id(&self, gateway_order_id: &str) -> Option<PaymentTransaction> {
        let state = self.inner.lock().expect("lock wallet store");
        state
            .payments
            .iter()
            .find(|row| row.gateway_order_id == gateway_order_id)
            .cloned()
    }

    fn transition_payment(
        &self,
        gateway_order_id: &str,
        to: PaymentStatus,
        gateway_payment_id: Option<String>,
        now_ms: i64,
    ) -> Result<PaymentTransition, HuntError> {
        if !to.is_terminal() {
            return Err(HuntError::FatalInvariant {
                reason: "payment transitions only target terminal statuses".to_string(),
            });
        }
        let mut state = self.inner.lock().expect("lock wallet store");
        let row = state
            .payments
            .iter_mut()
            .find(|row| row.gateway_order_id == gateway_order_id)
            .ok_or_else(|| HuntError::NotFound {
                entity: "payment transaction".to_string(),
                id: gateway_order_id.to_string(),
            })?;
        if row.status.is_terminal() {
            return Ok(PaymentTransition::AlreadyTerminal(row.clone()));
        }
        row.status = to;
        row.updated_at_ms = now_ms;
        if gateway_payment_id.is_some() {
            row.gateway_payment_id = gateway_payment_id;
        }
        Ok(PaymentTransition::Applied(row.clone()))
    }
}
