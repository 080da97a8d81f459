//! Engine module - the reward distribution pipeline.
//!
//! This module contains the stores and flows for:
//! - Hunt claiming and status progression
//! - Task completion with atomic rank assignment
//! - Durable reward/debit publishing with retry
//! - Queue consumption into the idempotent wallet ledger
//! - Gateway webhook settlement
//! - Reconciliation between completions and ledger credits

mod audit;
mod claims;
mod completion;
mod consumer;
mod error;
mod hints;
mod ledger;
mod payments;
mod publisher;
mod quiz;
mod reconcile;
mod rewards;
mod store;
mod util;
mod zones;

#[cfg(test)]
mod tests;

// Re-export all public types

// Error
pub use error::{HuntError, PublicError};

// Audit
pub use audit::{AuditDraft, AuditKind, AuditQuery, AuditRecord, WalletAuditTrail};

// Stores
pub use store::{
    HuntStore, InMemoryHuntStore, InMemoryWalletStore, LedgerAppend, NewLedgerEntry,
    NewPaymentTransaction, PaymentTransition, WalletStore,
};

// Zones
pub use zones::ZoneDirectory;

// Quiz scoring
pub use quiz::{verify_quiz, QuizAnswer, QuizVerdict, PASS_THRESHOLD_PERCENT};

// Reward tiers
pub use rewards::reward_for_rank;

// Claims
pub use claims::{ClaimManager, DiscoveryConfig, DEFAULT_NEARBY_PAGE_SIZE};

// Completion
pub use completion::{CompleteTaskOutcome, CompletionFlow};

// Publishing
pub use publisher::{
    PublishReport, PublishRetryPolicy, WalletEventPublisher, DEFAULT_PUBLISH_BASE_DELAY_MS,
    DEFAULT_PUBLISH_MAX_ATTEMPTS,
};

// Consumption
pub use consumer::{
    ConsumerKind, ConsumerRuntimeConfig, ConsumerRuntimeSnapshot, ConsumerTickReport,
    WalletConsumer, WalletConsumerRuntime, DEFAULT_CONSUMER_TICK_INTERVAL_MS,
};

// Ledger
pub use ledger::{Applied, WalletLedger};

// Payments
pub use payments::{
    payment_event_key, sign_hmac_sha256, NewPaymentSession, PaymentProcessor, WebhookOutcome,
    WebhookVerifier, PAYMENT_EVENT_KEY_V1_PREFIX,
};

// Hints
pub use hints::{
    HintUnlockFlow, HintUnlockOutcome, LedgerWalletRpc, WalletRpc, HINT_DEBIT_REASON,
};

// Reconciliation
pub use reconcile::{
    reconcile_rewards, MissingCredit, OrphanCredit, RewardReconciliationReport,
};

pub use util::now_ms;
