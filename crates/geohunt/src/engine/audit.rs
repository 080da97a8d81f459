//! Append-only audit trail for everything that touches money.
//!
//! Every publish failure, applied credit/debit, duplicate skip, webhook
//! rejection and payment outcome lands here with the ids and amounts involved,
//! so any event can be reconstructed for manual reconciliation.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    PublishAttemptFailed,
    PublishTerminalFailure,
    CreditApplied,
    DebitApplied,
    DuplicateEventSkipped,
    WithdrawalCreated,
    WebhookRejected,
    PaymentCaptured,
    PaymentFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub seq: u64,
    pub at_ms: i64,
    pub kind: AuditKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hunt_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// An [`AuditRecord`] before the trail assigns its sequence number.
#[derive(Debug, Clone, Default)]
pub struct AuditDraft {
    pub user_id: Option<String>,
    pub hunt_id: Option<String>,
    pub task_id: Option<String>,
    pub amount: Option<u64>,
    pub event_key: Option<String>,
    pub detail: Option<String>,
}

impl AuditDraft {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    pub fn with_hunt(mut self, hunt_id: &str) -> Self {
        self.hunt_id = Some(hunt_id.to_string());
        self
    }

    pub fn with_task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_event_key(mut self, event_key: &str) -> Self {
        self.event_key = Some(event_key.to_string());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Filter criteria for reading the trail back.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuditQuery {
    pub kind: Option<AuditKind>,
    pub user_id: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

impl AuditQuery {
    pub fn of_kind(kind: AuditKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if record.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(from_ms) = self.from_ms {
            if record.at_ms < from_ms {
                return false;
            }
        }
        if let Some(to_ms) = self.to_ms {
            if record.at_ms > to_ms {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Default)]
struct TrailState {
    next_seq: u64,
    records: Vec<AuditRecord>,
}

#[derive(Clone, Default)]
pub struct WalletAuditTrail {
    inner: Arc<Mutex<TrailState>>,
}

impl WalletAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, kind: AuditKind, at_ms: i64, draft: AuditDraft) -> AuditRecord {
        let mut state = self.inner.lock().expect("lock audit trail");
        state.next_seq += 1;
        let record = AuditRecord {
            seq: state.next_seq,
            at_ms,
            kind,
            user_id: draft.user_id,
            hunt_id: draft.hunt_id,
            task_id: draft.task_id,
            amount: draft.amount,
            event_key: draft.event_key,
            detail: draft.detail,
        };
        state.records.push(record.clone());
        record
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        let state = self.inner.lock().expect("lock audit trail");
        state.records.clone()
    }

    pub fn query(&self, query: &AuditQuery) -> Vec<AuditRecord> {
        let state = self.inner.lock().expect("lock audit trail");
        state
            .records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect()
    }

    pub fn count_of_kind(&self, kind: AuditKind) -> usize {
        self.query(&AuditQuery::of_kind(kind)).len()
    }
}
