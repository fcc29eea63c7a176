//! Domain errors and the wire error codes shared by every surface

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes exposed in the uniform `{error: {code, message, details}}` envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    ServiceUnavailable,
    TimeoutError,
    DatabaseError,
    RateLimitExceeded,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::TimeoutError => "TIMEOUT_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the pure domain layer
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Signal {0} is already classified")]
    AlreadyClassified(String),

    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Validation(_) | CoreError::InvalidConfig(_) => ErrorCode::ValidationError,
            CoreError::AlreadyClassified(_) | CoreError::InvalidTransition { .. } => {
                ErrorCode::ServiceUnavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_message_is_not_scoring_specific() {
        let err = CoreError::InvalidConfig("model_timeout_ms must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: model_timeout_ms must be positive");
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_codes_serialize_screaming_snake() {
        assert_eq!(serde_json::to_value(ErrorCode::RateLimitExceeded).unwrap(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(ErrorCode::TimeoutError.to_string(), "TIMEOUT_ERROR");
    }
}
