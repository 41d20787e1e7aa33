//! Structured Logging for the Megabolsa Backend
//!
//! Provides structured logging with:
//! - JSON output for log aggregation in production
//! - Correlation IDs for request tracing
//! - Domain events for deposits, mints and withdrawals
//!
//! # Usage
//!
//! ```rust,ignore
//! use megabolsa::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, true)?;
//! tracing::info!(target: "megabolsa::api", request_id = %id, "Processing webhook");
//! ```

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// API request/response events
    Api,
    /// Fiat deposit (payment intent, webhook) events
    Deposit,
    /// Token mint/burn submissions
    Mint,
    /// Withdrawal events
    Withdrawal,
    /// Security events (rate limiting, rejected input)
    Security,
    /// System events (startup, shutdown)
    System,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    pub level: String,
    pub category: EventCategory,
    pub message: String,
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Duration in milliseconds (for request events)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for error events
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: format!("{:?}", level).to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }
}

// ============================================================================
// Event Helpers
// ============================================================================

/// Log a security-related event
pub fn log_security_event(event_type: &str, details: serde_json::Value, correlation_id: Option<&str>) {
    let mut event = LogEvent::new(LogLevel::Warn, EventCategory::Security, event_type)
        .with_data(details);

    if let Some(id) = correlation_id {
        event = event.with_correlation_id(id);
    }

    tracing::warn!(target: "megabolsa::security", "{}", event.to_json());
}

/// Log an API response with its latency
pub fn log_api_response(
    method: &str,
    path: &str,
    status: u16,
    duration_ms: u64,
    correlation_id: &str,
) {
    let level = if status >= 500 {
        LogLevel::Error
    } else if status >= 400 {
        LogLevel::Warn
    } else {
        LogLevel::Info
    };

    let event = LogEvent::new(level, EventCategory::Api, format!("{} {} -> {}", method, path, status))
        .with_correlation_id(correlation_id)
        .with_duration(duration_ms)
        .with_data(serde_json::json!({
            "method": method,
            "path": path,
            "status": status
        }));

    match level {
        LogLevel::Error => tracing::error!(target: "megabolsa::api", "{}", event.to_json()),
        LogLevel::Warn => tracing::warn!(target: "megabolsa::api", "{}", event.to_json()),
        _ => tracing::info!(target: "megabolsa::api", "{}", event.to_json()),
    }
}

/// Log a deposit (payment) event
pub fn log_deposit_event(
    event_type: &str,
    payment_id: &str,
    amount_brl: &str,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Deposit, event_type)
        .with_correlation_id(payment_id)
        .with_data(serde_json::json!({
            "payment_id": payment_id,
            "amount_brl": amount_brl,
            "success": success
        }));

    if let Some(err) = error {
        event = event.with_error("DEPOSIT_ERROR", err);
    }

    if success {
        tracing::info!(target: "megabolsa::deposit", "{}", event.to_json());
    } else {
        tracing::error!(target: "megabolsa::deposit", "{}", event.to_json());
    }
}

/// Log a mint or burn submission
pub fn log_mint_event(
    event_type: &str,
    address: &str,
    amount: &str,
    queue_id: Option<&str>,
    error: Option<&str>,
) {
    let success = error.is_none();
    let mut event = LogEvent::new(
        if success { LogLevel::Info } else { LogLevel::Error },
        EventCategory::Mint,
        event_type,
    )
    .with_data(serde_json::json!({
        "address": address,
        "amount": amount,
        "queue_id": queue_id,
    }));

    if let Some(id) = queue_id {
        event = event.with_correlation_id(id);
    }
    if let Some(err) = error {
        event = event.with_error("ENGINE_ERROR", err);
    }

    if success {
        tracing::info!(target: "megabolsa::mint", "{}", event.to_json());
    } else {
        tracing::error!(target: "megabolsa::mint", "{}", event.to_json());
    }
}

/// Log a withdrawal event
pub fn log_withdrawal_event(
    event_type: &str,
    withdrawal_id: &str,
    token_amount: u64,
    user_address: &str,
    success: bool,
    error: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Withdrawal, event_type)
        .with_correlation_id(withdrawal_id)
        .with_data(serde_json::json!({
            "withdrawal_id": withdrawal_id,
            "token_amount": token_amount,
            "user_address": user_address,
            "success": success
        }));

    if let Some(err) = error {
        event = event.with_error("WITHDRAWAL_ERROR", err);
    }

    if success {
        tracing::info!(target: "megabolsa::withdrawal", "{}", event.to_json());
    } else {
        tracing::error!(target: "megabolsa::withdrawal", "{}", event.to_json());
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Minimum log level to output
/// * `json_format` - Use JSON format (recommended for production)
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_filter();
        EnvFilter::new(format!(
            "megabolsa={level},megabolsa_api={level},tower_http={level},axum={level}"
        ))
    });

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from MegabolsaConfig
pub fn init_from_config(config: &super::config::MegabolsaConfig) -> Result<(), LoggingError> {
    init_logging(LogLevel::from(config.log_level.as_str()), config.log_json)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a unique correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Deposit, "payment approved")
            .with_correlation_id("pay-123")
            .with_data(serde_json::json!({"amount_brl": "10.00"}))
            .with_duration(42);

        let json = event.to_json();
        assert!(json.contains("payment approved"));
        assert!(json.contains("pay-123"));
        assert!(json.contains("\"deposit\""));
        assert!(json.contains("42"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_correlation_id_generation() {
        let id1 = generate_correlation_id();
        let id2 = generate_correlation_id();

        assert_eq!(id1.len(), 12);
        assert_ne!(id1, id2);
    }
}
