//! Core error types for toolsync.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A value could not be encoded to, or decoded from, canonical JSON
    InvalidEncoding {
        /// What failed to encode or decode
        reason: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEncoding { reason } => write!(f, "Invalid encoding: {}", reason),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEncoding {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidEncoding {
            reason: "key must be a string".to_string(),
        };
        assert_eq!(format!("{}", err), "Invalid encoding: key must be a string");
    }

    #[test]
    fn test_from_serde_json() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: CoreError = parse.unwrap_err().into();
        assert!(matches!(err, CoreError::InvalidEncoding { .. }));
    }
}
