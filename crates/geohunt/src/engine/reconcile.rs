//! Offline reconciliation between the hunt store and the wallet ledger.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use geohunt_proto::wallet::reward_event_key;

use super::store::{HuntStore, WalletStore};
use crate::models::{LedgerCategory, TransactionType};

/// A rewarded completion with no task credit in the ledger. The expected
/// event key is recomputable because the completion flow stamps the event
/// with the completion timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingCredit {
    pub user_id: String,
    pub hunt_id: String,
    pub task_id: String,
    pub reward: u64,
    pub expected_event_key: String,
}

/// A task credit in the ledger that no rewarded completion backs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanCredit {
    pub entry_id: u64,
    pub user_id: String,
    pub amount: u64,
    pub event_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RewardReconciliationReport {
    pub checked_completions: usize,
    pub checked_entries: usize,
    pub missing_credits: Vec<MissingCredit>,
    pub orphan_credits: Vec<OrphanCredit>,
}

impl RewardReconciliationReport {
    pub fn is_ok(&self) -> bool {
        self.missing_credits.is_empty() && self.orphan_credits.is_empty()
    }
}

/// Cross-check every rewarded completion against the ledger's task credits.
///
/// This is the manual backstop for terminal publish failures: a completion
/// whose reward event never reached the queue shows up in `missing_credits`
/// with the event key an operator can replay.
pub fn reconcile_rewards(
    hunt_store: &dyn HuntStore,
    wallet_store: &dyn WalletStore,
) -> RewardReconciliationReport {
    let completions = hunt_store.completions();
    let entries = wallet_store.entries();

    let ledger_keys: BTreeSet<&str> = entries
        .iter()
        .filter(|entry| {
            entry.category == LedgerCategory::Task
                && entry.transaction_type == TransactionType::Credit
        })
        .filter_map(|entry| entry.event_key.as_deref())
        .collect();

    let mut report = RewardReconciliationReport::default();
    let mut expected_keys = BTreeSet::new();
    for completion in &completions {
        if completion.reward == 0 {
            continue;
        }
        report.checked_completions += 1;
        let key = reward_event_key(
            &completion.user_id,
            &completion.hunt_id,
            &completion.task_id,
            completion.completed_at_ms,
        );
        if !ledger_keys.contains(key.as_str()) {
            report.missing_credits.push(MissingCredit {
                user_id: completion.user_id.clone(),
                hunt_id: completion.hunt_id.clone(),
                task_id: completion.task_id.clone(),
                reward: completion.reward,
                expected_event_key: key.clone(),
            });
        }
        expected_keys.insert(key);
    }

    for entry in &entries {
        if entry.category != LedgerCategory::Task
            || entry.transaction_type != TransactionType::Credit
        {
            continue;
        }
        report.checked_entries += 1;
        let backed = entry
            .event_key
            .as_deref()
            .is_some_and(|key| expected_keys.contains(key));
        if !backed {
            report.orphan_credits.push(OrphanCredit {
                entry_id: entry.id,
                user_id: entry.user_id.clone(),
                amount: entry.amount,
                event_key: entry.event_key.clone(),
            });
        }
    }

    report
}
