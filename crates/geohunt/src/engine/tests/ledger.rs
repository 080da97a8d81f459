use super::super::*;
use crate::models::{LedgerCategory, TransactionType, WalletKind};
use geohunt_proto::wallet::reward_event_key;
use geohunt_proto::wallet::RewardEvent;
use std::sync::Arc;

fn ledger() -> (Arc<InMemoryWalletStore>, WalletAuditTrail, WalletLedger) {
    let store = Arc::new(InMemoryWalletStore::new());
    let audit = WalletAuditTrail::new();
    let ledger = WalletLedger::new(store.clone(), audit.clone());
    (store, audit, ledger)
}

fn reward_event(user_id: &str, amount: u64, timestamp_ms: i64) -> RewardEvent {
    RewardEvent {
        user_id: user_id.to_string(),
        hunt_id: "hunt-1".to_string(),
        task_id: "task-1".to_string(),
        amount,
        rank: 1,
        claim_id: Some(1),
        task_name: "fountain mission".to_string(),
        hunt_name: "old town run".to_string(),
        timestamp_ms,
        idempotency_key: reward_event_key(user_id, "hunt-1", "task-1", timestamp_ms),
    }
}

#[test]
fn balances_are_recomputed_from_the_entries_per_wallet() {
    let (_, _, ledger) = ledger();

    ledger
        .credit(
            "user-1",
            WalletKind::Coin,
            100,
            LedgerCategory::Task,
            "task reward",
            None,
            None,
            10_000,
        )
        .expect("credit coins");
    ledger
        .debit(
            "user-1",
            WalletKind::Coin,
            30,
            LedgerCategory::Withdrawal,
            "withdrawal",
            None,
            None,
            11_000,
        )
        .expect("debit coins");
    ledger
        .credit(
            "user-1",
            WalletKind::Token,
            50,
            LedgerCategory::Payment,
            "token pack",
            None,
            None,
            12_000,
        )
        .expect("credit tokens");

    assert_eq!(ledger.balance("user-1", WalletKind::Coin), 70);
    assert_eq!(ledger.balance("user-1", WalletKind::Token), 50);
    assert_eq!(ledger.balance("user-2", WalletKind::Coin), 0);
}

#[test]
fn lifetime_earnings_count_credits_only_within_a_category() {
    let (_, _, ledger) = ledger();

    ledger
        .credit(
            "user-1",
            WalletKind::Coin,
            100,
            LedgerCategory::Task,
            "reward one",
            None,
            None,
            10_000,
        )
        .expect("first reward");
    ledger
        .credit(
            "user-1",
            WalletKind::Coin,
            50,
            LedgerCategory::Task,
            "reward two",
            None,
            None,
            11_000,
        )
        .expect("second reward");
    ledger
        .credit_referral_bonus("user-1", 25, "user-2", 12_000)
        .expect("referral bonus");
    ledger
        .create_withdrawal("user-1", 60, 13_000)
        .expect("withdrawal");

    assert_eq!(
        ledger.lifetime_earnings("user-1", WalletKind::Coin, LedgerCategory::Task),
        150
    );
    assert_eq!(
        ledger.lifetime_earnings("user-1", WalletKind::Coin, LedgerCategory::Referral),
        25
    );
    // The withdrawal reduced the balance but not the lifetime totals.
    assert_eq!(ledger.balance("user-1", WalletKind::Coin), 115);
}

#[test]
fn withdrawals_must_be_covered_by_the_recomputed_balance() {
    let (store, audit, ledger) = ledger();
    ledger
        .credit(
            "user-1",
            WalletKind::Coin,
            50,
            LedgerCategory::Task,
            "reward",
            None,
            None,
            10_000,
        )
        .expect("credit");

    let err = ledger
        .create_withdrawal("user-1", 80, 11_000)
        .expect_err("more than the balance");
    assert!(matches!(err, HuntError::Validation { .. }));
    assert_eq!(store.entries_for("user-1").len(), 1);

    let row = ledger
        .create_withdrawal("user-1", 50, 12_000)
        .expect("covered withdrawal");
    assert_eq!(row.transaction_type, TransactionType::Debit);
    assert_eq!(row.category, LedgerCategory::Withdrawal);
    assert_eq!(ledger.balance("user-1", WalletKind::Coin), 0);
    assert_eq!(audit.count_of_kind(AuditKind::WithdrawalCreated), 1);
}

#[test]
fn referral_bonus_pays_out_once_per_referred_user() {
    let (store, _, ledger) = ledger();

    ledger
        .credit_referral_bonus("user-1", 25, "user-2", 10_000)
        .expect("first referral");
    let err = ledger
        .credit_referral_bonus("user-1", 25, "user-2", 11_000)
        .expect_err("same referral again");
    assert!(matches!(err, HuntError::Conflict { .. }));
    assert_eq!(store.entries_for("user-1").len(), 1);

    // A different referred user is a fresh bonus.
    ledger
        .credit_referral_bonus("user-1", 25, "user-3", 12_000)
        .expect("new referral");
    assert_eq!(ledger.balance("user-1", WalletKind::Coin), 50);
}

#[test]
fn direct_writes_with_a_reused_event_key_are_conflicts() {
    let (_, _, ledger) = ledger();
    ledger
        .credit(
            "user-1",
            WalletKind::Coin,
            10,
            LedgerCategory::Task,
            "first",
            None,
            Some("key-1".to_string()),
            10_000,
        )
        .expect("first write");

    let err = ledger
        .credit(
            "user-1",
            WalletKind::Coin,
            10,
            LedgerCategory::Task,
            "second",
            None,
            Some("key-1".to_string()),
            11_000,
        )
        .expect_err("reused key");
    assert!(matches!(err, HuntError::Conflict { .. }));
}

#[test]
fn applying_the_same_reward_event_twice_is_a_noop() {
    let (store, audit, ledger) = ledger();
    let event = reward_event("user-1", 100, 20_000);

    let first = ledger
        .apply_credit_event(&event, 21_000)
        .expect("first apply");
    assert!(matches!(first, Applied::Inserted(_)));

    let second = ledger
        .apply_credit_event(&event, 22_000)
        .expect("second apply");
    let Applied::Duplicate(existing) = second else {
        panic!("redelivery must be a duplicate");
    };
    assert_eq!(existing.id, first.entry().id);

    assert_eq!(store.entries_for("user-1").len(), 1);
    assert_eq!(ledger.balance("user-1", WalletKind::Coin), 100);
    assert_eq!(audit.count_of_kind(AuditKind::CreditApplied), 1);
    assert_eq!(audit.count_of_kind(AuditKind::DuplicateEventSkipped), 1);
}

#[test]
fn credit_event_entries_carry_the_task_description_and_key() {
    let (store, _, ledger) = ledger();
    let event = reward_event("user-1", 100, 20_000);
    ledger
        .apply_credit_event(&event, 21_000)
        .expect("apply credit");

    let entries = store.entries_for("user-1");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].wallet, WalletKind::Coin);
    assert_eq!(entries[0].category, LedgerCategory::Task);
    assert_eq!(
        entries[0].description,
        "task reward: fountain mission (old town run)"
    );
    assert_eq!(
        entries[0].event_key.as_deref(),
        Some(event.idempotency_key.as_str())
    );
}

#[test]
fn zero_amount_writes_are_rejected() {
    let (store, _, ledger) = ledger();

    let err = ledger
        .credit(
            "user-1",
            WalletKind::Coin,
            0,
            LedgerCategory::Task,
            "nothing",
            None,
            None,
            10_000,
        )
        .expect_err("zero amount");
    assert!(matches!(err, HuntError::Validation { .. }));
    assert!(store.entries_for("user-1").is_empty());
}
