//! Payment-gateway sessions and signed webhook settlement.

use std::collections::BTreeMap;
use std::sync::Arc;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use geohunt_proto::gateway::{GatewayEventKind, GatewayWebhookEvent, NOTES_USER_ID_KEY};
use geohunt_proto::WireError;

use super::audit::{AuditDraft, AuditKind, WalletAuditTrail};
use super::error::HuntError;
use super::ledger::WalletLedger;
use super::store::{NewPaymentTransaction, PaymentTransition, WalletStore};
use crate::models::{LedgerCategory, PaymentStatus, PaymentTransaction, PaymentType, WalletLedgerEntry};

type HmacSha256 = Hmac<Sha256>;

pub const PAYMENT_EVENT_KEY_V1_PREFIX: &str = "payment:v1:";

/// Ledger event key for the credit minted when a gateway order settles. One
/// order settles at most once, so the order id alone dedupes replays.
pub fn payment_event_key(gateway_order_id: &str) -> String {
    format!("{PAYMENT_EVENT_KEY_V1_PREFIX}{gateway_order_id}")
}

#[derive(Debug, Clone)]
enum VerifierKind {
    HmacSha256 {
        key: Vec<u8>,
    },
    Ed25519 {
        verifying_key: VerifyingKey,
        public_key_hex: String,
    },
}

/// Checks the gateway signature over the raw webhook body, before any parsing.
/// HMAC mode compares in constant time via `verify_slice`.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    kind: VerifierKind,
}

impl WebhookVerifier {
    pub fn hmac_sha256(key: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: VerifierKind::HmacSha256 { key: key.into() },
        }
    }

    pub fn ed25519(public_key_hex: &str) -> Result<Self, HuntError> {
        let key_bytes = decode_hex_array::<32>(public_key_hex, "gateway public key")?;
        let verifying_key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| {
            HuntError::Validation {
                field: "public_key".to_string(),
                reason: "gateway public key is not a valid ed25519 key".to_string(),
            }
        })?;
        Ok(Self {
            kind: VerifierKind::Ed25519 {
                verifying_key,
                public_key_hex: public_key_hex.to_string(),
            },
        })
    }

    pub fn public_key_hex(&self) -> Option<&str> {
        match &self.kind {
            VerifierKind::HmacSha256 { .. } => None,
            VerifierKind::Ed25519 { public_key_hex, .. } => Some(public_key_hex),
        }
    }

    pub fn verify(&self, raw_body: &[u8], signature_hex: &str) -> Result<(), HuntError> {
        match &self.kind {
            VerifierKind::HmacSha256 { key } => {
                let signature =
                    hex::decode(signature_hex).map_err(|_| signature_rejected("not valid hex"))?;
                let mut mac = HmacSha256::new_from_slice(key).map_err(|_| {
                    HuntError::FatalInvariant {
                        reason: "webhook hmac key was rejected".to_string(),
                    }
                })?;
                mac.update(raw_body);
                mac.verify_slice(&signature)
                    .map_err(|_| signature_rejected("signature mismatch"))
            }
            VerifierKind::Ed25519 { verifying_key, .. } => {
                let signature_bytes = decode_hex_array::<64>(signature_hex, "signature")?;
                let signature = Signature::from_bytes(&signature_bytes);
                verifying_key
                    .verify(raw_body, &signature)
                    .map_err(|_| signature_rejected("signature mismatch"))
            }
        }
    }
}

/// Produce the hex HMAC-SHA256 signature the gateway would put in
/// [`geohunt_proto::gateway::WEBHOOK_SIGNATURE_HEADER`].
pub fn sign_hmac_sha256(key: &[u8], raw_body: &[u8]) -> Result<String, HuntError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| HuntError::FatalInvariant {
        reason: "webhook hmac key was rejected".to_string(),
    })?;
    mac.update(raw_body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn signature_rejected(reason: &str) -> HuntError {
    HuntError::Validation {
        field: "signature".to_string(),
        reason: reason.to_string(),
    }
}

fn decode_hex_array<const N: usize>(input: &str, field: &str) -> Result<[u8; N], HuntError> {
    let bytes = hex::decode(input).map_err(|_| HuntError::Validation {
        field: field.to_string(),
        reason: format!("{field} must be valid hex"),
    })?;
    bytes.try_into().map_err(|_| HuntError::Validation {
        field: field.to_string(),
        reason: format!("{field} must be {N}-byte hex"),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentSession {
    pub user_id: String,
    /// Charge handed to the gateway, in the smallest currency unit.
    pub amount: u64,
    pub currency: String,
    /// Wallet units credited if the payment captures.
    pub quantity: u64,
    pub payment_type: PaymentType,
    pub gateway: String,
    pub gateway_order_id: String,
}

/// What a verified webhook did to the referenced transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Captured {
        transaction: PaymentTransaction,
        entry: WalletLedgerEntry,
    },
    MarkedFailed {
        transaction: PaymentTransaction,
    },
    /// The transaction was already terminal; the replayed webhook changed
    /// nothing.
    ReplayIgnored {
        transaction: PaymentTransaction,
    },
}

#[derive(Clone)]
pub struct PaymentProcessor {
    store: Arc<dyn WalletStore>,
    ledger: WalletLedger,
    verifier: WebhookVerifier,
    audit: WalletAuditTrail,
}

impl PaymentProcessor {
    pub fn new(
        store: Arc<dyn WalletStore>,
        ledger: WalletLedger,
        verifier: WebhookVerifier,
        audit: WalletAuditTrail,
    ) -> Self {
        Self {
            store,
            ledger,
            verifier,
            audit,
        }
    }

    /// Open a pending transaction for a gateway checkout. The buyer's user id
    /// is stashed in the gateway metadata so the webhook can cross-check it.
    pub fn create_session(
        &self,
        session: NewPaymentSession,
        now_ms: i64,
    ) -> Result<PaymentTransaction, HuntError> {
        if session.user_id.is_empty() {
            return Err(HuntError::Validation {
                field: "user_id".to_string(),
                reason: "user id must not be empty".to_string(),
            });
        }
        if session.gateway_order_id.is_empty() {
            return Err(HuntError::Validation {
                field: "gateway_order_id".to_string(),
                reason: "gateway order id must not be empty".to_string(),
            });
        }
        if session.amount == 0 {
            return Err(HuntError::Validation {
                field: "amount".to_string(),
                reason: "payment amount must be positive".to_string(),
            });
        }
        if session.quantity == 0 {
            return Err(HuntError::Validation {
                field: "quantity".to_string(),
                reason: "purchased quantity must be positive".to_string(),
            });
        }

        let mut metadata = BTreeMap::new();
        metadata.insert(NOTES_USER_ID_KEY.to_string(), session.user_id.clone());
        self.store.insert_payment(NewPaymentTransaction {
            user_id: session.user_id,
            amount: session.amount,
            currency: session.currency,
            quantity: session.quantity,
            payment_type: session.payment_type,
            gateway: session.gateway,
            gateway_order_id: session.gateway_order_id,
            metadata,
            created_at_ms: now_ms,
        })
    }

    /// Settle one gateway webhook.
    ///
    /// Signature verification runs over the raw bytes before anything is
    /// parsed; a rejected webhook touches no row. Capture drives the
    /// transaction `pending -> success` and credits the purchased wallet
    /// exactly once; a replay of a settled order is a no-op reported as
    /// [`WebhookOutcome::ReplayIgnored`].
    pub fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature_hex: &str,
        now_ms: i64,
    ) -> Result<WebhookOutcome, HuntError> {
        if let Err(err) = self.verifier.verify(raw_body, signature_hex) {
            self.audit_rejected(now_ms, None, &format!("signature rejected: {err}"));
            return Err(err);
        }

        // The body comes from outside; any parse failure is the caller's
        // problem, not an internal serialization error.
        let event = match GatewayWebhookEvent::from_json_bytes(raw_body) {
            Ok(event) => event,
            Err(err) => {
                self.audit_rejected(now_ms, None, &format!("payload rejected: {err}"));
                let reason = match err {
                    WireError::Invalid { reason } => reason,
                    WireError::Serde(detail) => detail,
                };
                return Err(HuntError::Validation {
                    field: "payload".to_string(),
                    reason,
                });
            }
        };

        let Some(notes_user_id) = event.notes_user_id() else {
            self.audit_rejected(now_ms, None, "webhook notes carry no user id");
            return Err(HuntError::Validation {
                field: "notes.user_id".to_string(),
                reason: "webhook notes must carry the buyer's user id".to_string(),
            });
        };

        let Some(transaction) = self.store.payment_by_order_id(&event.gateway_order_id) else {
            self.audit_rejected(
                now_ms,
                Some(notes_user_id),
                &format!("unknown gateway order {}", event.gateway_order_id),
            );
            return Err(HuntError::NotFound {
                entity: "payment".to_string(),
                id: event.gateway_order_id.clone(),
            });
        };
        if transaction.user_id != notes_user_id {
            self.audit_rejected(
                now_ms,
                Some(notes_user_id),
                &format!(
                    "webhook user does not match order {}",
                    event.gateway_order_id
                ),
            );
            return Err(HuntError::Validation {
                field: "notes.user_id".to_string(),
                reason: "webhook user does not match the order".to_string(),
            });
        }

        match event.event {
            GatewayEventKind::PaymentCaptured => self.capture(&event, now_ms),
            GatewayEventKind::PaymentFailed => self.mark_failed(&event, now_ms),
        }
    }

    fn capture(
        &self,
        event: &GatewayWebhookEvent,
        now_ms: i64,
    ) -> Result<WebhookOutcome, HuntError> {
        let transition = self.store.transition_payment(
            &event.gateway_order_id,
            PaymentStatus::Success,
            event.gateway_payment_id.clone(),
            now_ms,
        )?;
        match transition {
            PaymentTransition::Applied(transaction) => {
                let entry = self.ledger.credit(
                    &transaction.user_id,
                    transaction.payment_type.wallet(),
                    transaction.quantity,
                    LedgerCategory::Payment,
                    &format!(
                        "gateway purchase {} ({})",
                        transaction.gateway_order_id, transaction.gateway
                    ),
                    Some(transaction.id),
                    Some(payment_event_key(&transaction.gateway_order_id)),
                    now_ms,
                )?;
                self.audit.append(
                    AuditKind::PaymentCaptured,
                    now_ms,
                    AuditDraft::for_user(&transaction.user_id)
                        .with_amount(transaction.quantity)
                        .with_event_key(&payment_event_key(&transaction.gateway_order_id))
                        .with_detail(format!("order {}", transaction.gateway_order_id)),
                );
                Ok(WebhookOutcome::Captured { transaction, entry })
            }
            PaymentTransition::AlreadyTerminal(transaction) => {
                Ok(WebhookOutcome::ReplayIgnored { transaction })
            }
        }
    }

    fn mark_failed(
        &self,
        event: &GatewayWebhookEvent,
        now_ms: i64,
    ) -> Result<WebhookOutcome, HuntError> {
        let transition = self.store.transition_payment(
            &event.gateway_order_id,
            PaymentStatus::Failed,
            event.gateway_payment_id.clone(),
            now_ms,
        )?;
        match transition {
            PaymentTransition::Applied(transaction) => {
                self.audit.append(
                    AuditKind::PaymentFailed,
                    now_ms,
                    AuditDraft::for_user(&transaction.user_id)
                        .with_amount(transaction.amount)
                        .with_detail(format!("order {}", transaction.gateway_order_id)),
                );
                Ok(WebhookOutcome::MarkedFailed { transaction })
            }
            PaymentTransition::AlreadyTerminal(transaction) => {
                Ok(WebhookOutcome::ReplayIgnored { transaction })
            }
        }
    }

    fn audit_rejected(&self, now_ms: i64, user_id: Option<&str>, detail: &str) {
        let mut draft = AuditDraft::default().with_detail(detail);
        if let Some(user_id) = user_id {
            draft.user_id = Some(user_id.to_string());
        }
        self.audit.append(AuditKind::WebhookRejected, now_ms, draft);
    }
}
