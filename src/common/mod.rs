//! Common Infrastructure Module
//!
//! Shared utilities and configuration for the Megabolsa backend.
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - Common error types
//! - Outbound HTTP client policy

pub mod config;
pub mod error;
pub mod http;
pub mod logging;

// Re-exports for convenience
pub use config::{
    ConfigError, EngineConfig, HttpConfig, MegabolsaConfig, PaymentProviderConfig, PollerConfig,
};
pub use error::{AppError, Result};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_api_response, log_deposit_event,
    log_mint_event, log_security_event, log_withdrawal_event, EventCategory, LogEvent, LogLevel,
    LoggingError,
};
