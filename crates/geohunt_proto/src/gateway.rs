//! Payment-gateway webhook payload shapes.
//!
//! Signature verification always runs over the raw received body bytes, never a
//! re-serialized form, so parsing happens strictly after the signature check.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::wire_error::WireError;

pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Metadata key the processor requires in every webhook's notes.
pub const NOTES_USER_ID_KEY: &str = "user_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayEventKind {
    PaymentCaptured,
    PaymentFailed,
}

/// A gateway callback after the signature on the raw body has been verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayWebhookEvent {
    pub event: GatewayEventKind,
    pub gateway_order_id: String,
    #[serde(default)]
    pub gateway_payment_id: Option<String>,
    pub amount: u64,
    pub currency: String,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

impl GatewayWebhookEvent {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let event: GatewayWebhookEvent = serde_json::from_slice(bytes)?;
        if event.gateway_order_id.trim().is_empty() {
            return Err(WireError::Invalid {
                reason: "webhook gateway_order_id cannot be empty".to_string(),
            });
        }
        Ok(event)
    }

    /// The user id stashed in notes at session-creation time, if present.
    pub fn notes_user_id(&self) -> Option<&str> {
        self.notes
            .get(NOTES_USER_ID_KEY)
            .map(|value| value.as_str())
            .filter(|value| !value.trim().is_empty())
    }
}
