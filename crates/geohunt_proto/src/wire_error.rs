use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    Invalid { reason: String },
    Serde(String),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Invalid { reason } => write!(f, "invalid wire payload: {}", reason),
            WireError::Serde(detail) => write!(f, "wire codec error: {}", detail),
        }
    }
}

impl std::error::Error for WireError {}

impl From<serde_json::Error> for WireError {
    fn from(error: serde_json::Error) -> Self {
        WireError::Serde(error.to_string())
    }
}
