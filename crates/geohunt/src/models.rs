use crate::geometry::GeoPoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub zone_id: String,
    pub name: String,
    /// Ordered ring of lon/lat vertices, implicitly closed, >= 3 points.
    pub boundary: Vec<GeoPoint>,
    pub service_location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hunt {
    pub hunt_id: String,
    pub zone_id: String,
    pub name: String,
    pub location: GeoPoint,
    pub start_ms: i64,
    pub end_ms: i64,
    /// Claim TTL. A hunt without a configured duration cannot be claimed.
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub task_ids: Vec<String>,
}

impl Hunt {
    pub fn window_contains(&self, now_ms: i64) -> bool {
        self.start_ms <= now_ms && now_ms <= self.end_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question_id: String,
    pub prompt: String,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Quiz,
    Mission,
}

/// One reward bucket. Cumulative `user_count` across the tier list (ascending
/// by `level`) decides which completion rank falls into which bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTier {
    pub level: u32,
    pub user_count: u32,
    pub rewards: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuntTask {
    pub task_id: String,
    pub hunt_id: String,
    pub name: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
    #[serde(default)]
    pub tiers: Vec<RewardTier>,
}

impl HuntTask {
    /// Untiered tasks record completions without ranks or rewards.
    pub fn is_tiered(&self) -> bool {
        !self.tiers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Search,
    Claimed,
    Started,
    Arrived,
    Completed,
}

impl ClaimStatus {
    /// Forward-only status edges a caller may request. `Completed` is set by
    /// the task-completion flow, never by a direct status update.
    pub fn can_advance_to(self, to: ClaimStatus) -> bool {
        matches!(
            (self, to),
            (ClaimStatus::Claimed, ClaimStatus::Started)
                | (ClaimStatus::Started, ClaimStatus::Arrived)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Search => "search",
            ClaimStatus::Claimed => "claimed",
            ClaimStatus::Started => "started",
            ClaimStatus::Arrived => "arrived",
            ClaimStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuntClaim {
    pub id: u64,
    pub user_id: String,
    pub hunt_id: String,
    pub status: ClaimStatus,
    pub claimed_at_ms: i64,
    pub expire_at_ms: i64,
    #[serde(default)]
    pub completed_at_ms: Option<i64>,
}

impl HuntClaim {
    /// Advisory read-side check. Nothing sweeps expired claims; callers that
    /// care (completion, hint unlock) ask here.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expire_at_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTask {
    pub id: u64,
    pub hunt_id: String,
    pub task_id: String,
    pub user_id: String,
    #[serde(default)]
    pub claim_id: Option<u64>,
    /// 1-based completion order among ranked completions of this task. `None`
    /// means the completion did not qualify for a ranked reward (failed quiz,
    /// untiered task) and never consumed a reward slot.
    #[serde(default)]
    pub rank: Option<u32>,
    pub reward: u64,
    pub completed_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerCategory {
    Task,
    Referral,
    Withdrawal,
    Payment,
    Hint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    Coin,
    Token,
}

/// One immutable ledger row. Amounts are non-negative; direction lives in
/// `transaction_type`. Balance is always recomputed from rows, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletLedgerEntry {
    pub id: u64,
    pub user_id: String,
    pub wallet: WalletKind,
    pub transaction_type: TransactionType,
    pub amount: u64,
    pub category: LedgerCategory,
    #[serde(default)]
    pub payment_transaction_id: Option<u64>,
    /// Stored idempotency key; unique when present. Duplicate event delivery
    /// dedupes on this instead of double-crediting.
    #[serde(default)]
    pub event_key: Option<String>,
    pub description: String,
    pub created_at_ms: i64,
}

impl WalletLedgerEntry {
    pub fn signed_amount(&self) -> i64 {
        let amount = i64::try_from(self.amount).unwrap_or(i64::MAX);
        match self.transaction_type {
            TransactionType::Credit => amount,
            TransactionType::Debit => -amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Token,
    Coin,
}

impl PaymentType {
    pub fn wallet(self) -> WalletKind {
        match self {
            PaymentType::Token => WalletKind::Token,
            PaymentType::Coin => WalletKind::Coin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: u64,
    pub user_id: String,
    /// Money amount in the smallest currency unit.
    pub amount: u64,
    pub currency: String,
    /// Tokens or coins purchased; this is what the success credit pays out.
    pub quantity: u64,
    pub payment_type: PaymentType,
    pub gateway: String,
    pub gateway_order_id: String,
    #[serde(default)]
    pub gateway_payment_id: Option<String>,
    pub status: PaymentStatus,
    /// Stashed at session-creation time; webhook processing requires `user_id`
    /// here, since gateway callbacks carry no service-side context of their own.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_status_edges_are_forward_only() {
        assert!(ClaimStatus::Claimed.can_advance_to(ClaimStatus::Started));
        assert!(ClaimStatus::Started.can_advance_to(ClaimStatus::Arrived));
        assert!(!ClaimStatus::Arrived.can_advance_to(ClaimStatus::Started));
        assert!(!ClaimStatus::Claimed.can_advance_to(ClaimStatus::Arrived));
        assert!(!ClaimStatus::Arrived.can_advance_to(ClaimStatus::Completed));
        assert!(!ClaimStatus::Completed.can_advance_to(ClaimStatus::Started));
    }

    #[test]
    fn ledger_entry_sign_follows_transaction_type() {
        let mut entry = WalletLedgerEntry {
            id: 1,
            user_id: "user-1".to_string(),
            wallet: WalletKind::Coin,
            transaction_type: TransactionType::Credit,
            amount: 40,
            category: LedgerCategory::Task,
            payment_transaction_id: None,
            event_key: None,
            description: "task reward".to_string(),
            created_at_ms: 0,
        };
        assert_eq!(entry.signed_amount(), 40);
        entry.transaction_type = TransactionType::Debit;
        assert_eq!(entry.signed_amount(), -40);
    }

    #[test]
    fn payment_type_selects_the_wallet() {
        assert_eq!(PaymentType::Token.wallet(), WalletKind::Token);
        assert_eq!(PaymentType::Coin.wallet(), WalletKind::Coin);
    }

    #[test]
    fn expiry_is_a_strict_threshold() {
        let claim = HuntClaim {
            id: 1,
            user_id: "user-1".to_string(),
            hunt_id: "hunt-1".to_string(),
            status: ClaimStatus::Claimed,
            claimed_at_ms: 1_000,
            expire_at_ms: 2_000,
            completed_at_ms: None,
        };
        assert!(!claim.is_expired(2_000));
        assert!(claim.is_expired(2_001));
    }
}
