//! Error taxonomy for the reward pipeline.

use std::fmt;
use std::io;

use geohunt_broker::BrokerError;
use geohunt_proto::WireError;
use serde::{Deserialize, Serialize};

/// Every failure a pipeline operation can surface, bucketed by how the caller
/// recovers: fix the input (`Validation`), retry later (`TransientInfra`),
/// treat as permanent (`Conflict`, `NotFound`), blame a sibling service
/// (`Upstream`), or page someone (`FatalInvariant`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HuntError {
    Validation { field: String, reason: String },
    NotFound { entity: String, id: String },
    Conflict { reason: String },
    Upstream { service: String, reason: String },
    TransientInfra { reason: String },
    FatalInvariant { reason: String },
    Serde(String),
    Io(String),
}

impl HuntError {
    pub fn http_status(&self) -> u16 {
        match self {
            HuntError::Validation { .. } => 400,
            HuntError::NotFound { .. } => 404,
            HuntError::Conflict { .. } => 409,
            HuntError::Upstream { .. } => 502,
            HuntError::TransientInfra { .. } => 503,
            HuntError::FatalInvariant { .. } | HuntError::Serde(_) | HuntError::Io(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, HuntError::TransientInfra { .. })
    }

    /// The JSON body handed back to callers. Validation and conflict errors
    /// carry a field-level message; everything else is a generic message with
    /// no internal detail.
    pub fn to_public(&self) -> PublicError {
        match self {
            HuntError::Validation { field, reason } => PublicError {
                status: 400,
                error: "validation_error".to_string(),
                message: reason.clone(),
                field: Some(field.clone()),
            },
            HuntError::NotFound { entity, id } => PublicError {
                status: 404,
                error: "not_found".to_string(),
                message: format!("{entity} not found: {id}"),
                field: None,
            },
            HuntError::Conflict { reason } => PublicError {
                status: 409,
                error: "conflict".to_string(),
                message: reason.clone(),
                field: None,
            },
            HuntError::Upstream { .. } => PublicError {
                status: 502,
                error: "upstream_error".to_string(),
                message: "a dependent service failed".to_string(),
                field: None,
            },
            HuntError::TransientInfra { .. } => PublicError {
                status: 503,
                error: "temporarily_unavailable".to_string(),
                message: "the service is temporarily unavailable".to_string(),
                field: None,
            },
            HuntError::FatalInvariant { .. } | HuntError::Serde(_) | HuntError::Io(_) => {
                PublicError {
                    status: 500,
                    error: "internal_error".to_string(),
                    message: "an internal error occurred".to_string(),
                    field: None,
                }
            }
        }
    }
}

impl fmt::Display for HuntError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HuntError::Validation { field, reason } => {
                write!(f, "validation failed on {}: {}", field, reason)
            }
            HuntError::NotFound { entity, id } => write!(f, "{} not found: {}", entity, id),
            HuntError::Conflict { reason } => write!(f, "conflict: {}", reason),
            HuntError::Upstream { service, reason } => {
                write!(f, "upstream call to {} failed: {}", service, reason)
            }
            HuntError::TransientInfra { reason } => {
                write!(f, "transient infrastructure failure: {}", reason)
            }
            HuntError::FatalInvariant { reason } => {
                write!(f, "invariant violated: {}", reason)
            }
            HuntError::Serde(detail) => write!(f, "serialization error: {}", detail),
            HuntError::Io(detail) => write!(f, "io error: {}", detail),
        }
    }
}

impl std::error::Error for HuntError {}

impl From<serde_json::Error> for HuntError {
    fn from(error: serde_json::Error) -> Self {
        HuntError::Serde(error.to_string())
    }
}

impl From<io::Error> for HuntError {
    fn from(error: io::Error) -> Self {
        HuntError::Io(error.to_string())
    }
}

impl From<BrokerError> for HuntError {
    fn from(error: BrokerError) -> Self {
        HuntError::TransientInfra {
            reason: error.to_string(),
        }
    }
}

impl From<WireError> for HuntError {
    fn from(error: WireError) -> Self {
        match error {
            WireError::Invalid { reason } => HuntError::Validation {
                field: "payload".to_string(),
                reason,
            },
            WireError::Serde(detail) => HuntError::Serde(detail),
        }
    }
}

/// Structured error body for the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicError {
    pub status: u16,
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}
