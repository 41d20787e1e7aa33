//! Common Error Types for the Megabolsa Backend
//!
//! `AppError` is the boundary error every API handler converts into a JSON
//! body. Lower layers keep their own `thiserror` enums and convert here.

use thiserror::Error;

/// Root error type for request handling
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing secrets/URLs. Fatal, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed input, rejected before any external call
    #[error("validation error: {0}")]
    Validation(String),

    /// Non-2xx from the payment provider or the token engine
    #[error("upstream error: {message}")]
    Upstream {
        /// Upstream HTTP status, when there was a response
        status: Option<u16>,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Transaction submitted but not mined within the poll ceiling
    #[error("transaction {queue_id} not mined within the timeout period")]
    ConfirmationTimeout { queue_id: String },

    /// Expected metadata missing on an approved payment
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn upstream(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: msg.into(),
            details: None,
        }
    }

    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the at-least-once sender should redeliver
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Upstream { .. } | AppError::Storage(_) | AppError::Internal(_)
        )
    }

    /// HTTP status for API responses
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Config(_) => 500,
            AppError::Validation(_) => 400,
            AppError::Upstream { status, .. } => match status {
                Some(code) if (400..600).contains(code) => *code,
                _ => 502,
            },
            AppError::ConfirmationTimeout { .. } => 408,
            AppError::DataIntegrity(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::Storage(_) | AppError::Internal(_) => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Upstream { .. } => "UPSTREAM_ERROR",
            AppError::ConfirmationTimeout { .. } => "CONFIRMATION_TIMEOUT",
            AppError::DataIntegrity(_) => "DATA_INTEGRITY_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<crate::storage::StorageError> for AppError {
    fn from(err: crate::storage::StorageError) -> Self {
        match err {
            crate::storage::StorageError::NotFound(id) => AppError::NotFound(id),
            crate::storage::StorageError::Duplicate(id) => AppError::Conflict(id),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<super::config::ConfigError> for AppError {
    fn from(err: super::config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

// ============================================================================
// Service Layer Conversions
// ============================================================================

impl From<crate::engine::EngineError> for AppError {
    fn from(err: crate::engine::EngineError) -> Self {
        use crate::engine::EngineError;
        match err {
            // Engine statuses describe the engine call, not the client request
            EngineError::Api { status, body } => AppError::Upstream {
                status: None,
                message: body.clone(),
                details: Some(serde_json::json!({
                    "upstreamStatus": status,
                    "body": body,
                })),
            },
            e @ EngineError::InvalidQueueId(_) => AppError::Validation(e.to_string()),
            other => AppError::upstream(None, other.to_string()),
        }
    }
}

impl From<crate::engine::GatewayError> for AppError {
    fn from(err: crate::engine::GatewayError) -> Self {
        use crate::engine::GatewayError;
        match err {
            GatewayError::Engine(e) => e.into(),
            GatewayError::Poll(e) => AppError::upstream(None, e.to_string()),
        }
    }
}

impl From<crate::payments::ProviderError> for AppError {
    fn from(err: crate::payments::ProviderError) -> Self {
        use crate::payments::ProviderError;
        match err {
            ProviderError::Api {
                status,
                message,
                details,
            } => AppError::Upstream {
                status: Some(status),
                message,
                details: Some(details),
            },
            other => AppError::upstream(None, other.to_string()),
        }
    }
}

impl From<crate::payments::IntentError> for AppError {
    fn from(err: crate::payments::IntentError) -> Self {
        use crate::payments::IntentError;
        match err {
            IntentError::Validation(msg) => AppError::Validation(msg),
            e @ IntentError::InvalidNotificationUrl(_) => AppError::Validation(e.to_string()),
            IntentError::Provider(e) => e.into(),
            e @ IntentError::MissingQrCode { .. } => AppError::upstream(None, e.to_string()),
            e @ IntentError::RejectedRequest { .. } => AppError::Conflict(e.to_string()),
            IntentError::Storage(e) => e.into(),
        }
    }
}

impl From<crate::payments::ReconcileError> for AppError {
    fn from(err: crate::payments::ReconcileError) -> Self {
        use crate::payments::ReconcileError;
        match err {
            e @ ReconcileError::MissingMetadata { .. } => AppError::DataIntegrity(e.to_string()),
            // 5xx so the provider redelivers
            e @ ReconcileError::Fetch { .. } => AppError::Internal(e.to_string()),
            e @ ReconcileError::Mint { .. } => AppError::Internal(e.to_string()),
            ReconcileError::Storage(e) => AppError::Storage(e.to_string()),
        }
    }
}

impl From<crate::withdrawal::WithdrawalError> for AppError {
    fn from(err: crate::withdrawal::WithdrawalError) -> Self {
        use crate::withdrawal::WithdrawalError;
        match err {
            WithdrawalError::Validation(msg) => AppError::Validation(msg),
            WithdrawalError::NotFound(id) => AppError::NotFound(format!("withdrawal {}", id)),
            WithdrawalError::Storage(e) => e.into(),
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AppError::validation("amount must be at least 0.01");
        assert!(err.to_string().contains("0.01"));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_upstream_status_passthrough() {
        assert_eq!(AppError::upstream(Some(401), "unauthorized").status_code(), 401);
        assert_eq!(AppError::upstream(None, "connection reset").status_code(), 502);
        assert_eq!(AppError::upstream(Some(200), "odd").status_code(), 502);
    }

    #[test]
    fn test_timeout_is_distinct() {
        let err = AppError::ConfirmationTimeout {
            queue_id: "q-1".to_string(),
        };
        assert_eq!(err.status_code(), 408);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_engine_rejection_is_bad_gateway_with_body() {
        let err: AppError = crate::engine::EngineError::Api {
            status: 401,
            body: "invalid secret".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().contains("invalid secret"));
        match err {
            AppError::Upstream { details, .. } => {
                assert_eq!(details.unwrap()["upstreamStatus"], 401);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_provider_status_passes_through() {
        let err: AppError = crate::payments::ProviderError::Api {
            status: 400,
            message: "Invalid transaction_amount".to_string(),
            details: serde_json::json!({"cause": []}),
        }
        .into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "UPSTREAM_ERROR");
    }

    #[test]
    fn test_missing_metadata_is_not_retried() {
        let err: AppError = crate::payments::ReconcileError::MissingMetadata {
            payment_id: "p1".to_string(),
            reason: "recipient address missing".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), 400);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::upstream(Some(503), "busy").is_retryable());
        assert!(AppError::storage("locked").is_retryable());
        assert!(!AppError::config("missing ENGINE_URL").is_retryable());
        assert!(!AppError::data_integrity("no recipient").is_retryable());
    }

    #[test]
    fn test_client_mistakes_are_4xx() {
        let err: AppError = crate::payments::IntentError::RejectedRequest {
            payment_id: "778".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), 409);
        assert!(err.to_string().contains("new requestId"));

        let err: AppError = crate::engine::EngineError::InvalidQueueId("../x".to_string()).into();
        assert_eq!(err.status_code(), 400);
    }
}
