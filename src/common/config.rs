//! Environment-based Configuration for the Megabolsa Backend
//!
//! Configuration is loaded exactly once at process startup and handed to
//! every component constructor. Secrets (engine secret, provider token)
//! MUST come from environment variables, never from hardcoded values.
//!
//! # Required Environment Variables
//!
//! ## Token Engine (thirdweb Engine)
//! - `BACKEND_WALLET_ADDRESS` - Operator wallet that signs mint transactions
//! - `ENGINE_URL` - Engine base URL
//! - `THIRDWEB_SECRET_KEY` - Engine bearer secret
//!
//! ## Payment Provider (Mercado Pago)
//! - `MERCADOPAGO_ACCESS_TOKEN` - Provider bearer token
//!
//! ## Optional Settings
//! - `PUBLIC_BASE_URL` / `NEXT_PUBLIC_URL` - Public base URL for webhook callbacks
//! - `TOKEN_CONTRACT_ADDRESS` - ERC20 credit token address
//! - `CHAIN_ID` - Chain id used in engine contract routes (default: Base Sepolia)
//! - `MERCADOPAGO_API_URL` - Provider API base URL
//! - `MEGABOLSA_DB_PATH` - SQLite file for payment records (in-memory when unset)
//! - `MEGABOLSA_HTTP_TIMEOUT_SECS` - Timeout for every upstream call
//! - `MEGABOLSA_HTTP_RETRIES` - Retries for transient network errors
//! - `MEGABOLSA_POLL_ATTEMPTS` / `MEGABOLSA_POLL_INTERVAL_MS` - Confirmation poller
//! - `MEGABOLSA_CLAIM_AMOUNT` - Fixed token grant for the manual claim endpoint
//! - `MEGABOLSA_LOG_LEVEL` / `MEGABOLSA_LOG_JSON` - Logging
//! - `API_PORT` - Listen port

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default ERC20 credit token (Base Sepolia deployment)
pub const DEFAULT_TOKEN_ADDRESS: &str = "0xDA6EB77e8999Fd07D0E8443621C90ac1EDc7C259";

/// Base Sepolia
pub const DEFAULT_CHAIN_ID: u64 = 84532;

pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_MERCADOPAGO_API_URL: &str = "https://api.mercadopago.com";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnvVars(Vec<String>),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Token engine settings (mint-to, transfer, transaction status)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine base URL, without trailing slash
    pub base_url: String,
    /// Bearer secret
    pub secret_key: String,
    /// Operator wallet that signs mints
    pub operator_address: String,
    /// ERC20 credit token contract
    pub token_address: String,
    /// Chain id used in contract routes
    pub chain_id: u64,
}

/// Payment provider settings
#[derive(Debug, Clone)]
pub struct PaymentProviderConfig {
    /// Provider API base URL, without trailing slash
    pub api_url: String,
    /// Bearer access token
    pub access_token: String,
}

/// Confirmation poller settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Maximum number of status checks
    pub max_attempts: u32,
    /// Fixed delay between checks
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            interval: Duration::from_millis(3000),
        }
    }
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    /// Per-call timeout
    pub timeout: Duration,
    /// Retries for transient transport errors only
    pub max_retries: u32,
    /// Delay between transport retries
    pub retry_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 2,
            retry_delay: Duration::from_millis(250),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct MegabolsaConfig {
    /// Token engine; `None` when any engine variable is absent
    pub engine: Option<EngineConfig>,

    /// Payment provider; `None` when the access token is absent
    pub payments: Option<PaymentProviderConfig>,

    /// Public base URL used to build the webhook callback
    pub public_base_url: String,

    /// SQLite path for payment/withdrawal records
    pub db_path: Option<String>,

    /// Outbound HTTP policy
    pub http: HttpConfig,

    /// Confirmation poller
    pub poller: PollerConfig,

    /// Tokens granted by the manual claim endpoint
    pub claim_amount: u64,

    /// API listen port
    pub api_port: u16,

    /// Log level
    pub log_level: String,

    /// Emit JSON logs
    pub log_json: bool,

    /// Names of required variables that were absent
    pub(crate) missing: Vec<String>,
}

impl Default for MegabolsaConfig {
    fn default() -> Self {
        Self {
            engine: None,
            payments: None,
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            db_path: None,
            http: HttpConfig::default(),
            poller: PollerConfig::default(),
            claim_amount: 100,
            api_port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            missing: Vec::new(),
        }
    }
}

impl MegabolsaConfig {
    /// Load configuration from environment variables
    ///
    /// Missing engine or provider variables leave that section `None`;
    /// call [`MegabolsaConfig::require_complete`] to fail fast on them.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut missing = Vec::new();

        let operator = optional_var("BACKEND_WALLET_ADDRESS");
        let engine_url = optional_var("ENGINE_URL");
        let secret = optional_var("THIRDWEB_SECRET_KEY");

        for (name, value) in [
            ("BACKEND_WALLET_ADDRESS", &operator),
            ("ENGINE_URL", &engine_url),
            ("THIRDWEB_SECRET_KEY", &secret),
        ] {
            if value.is_none() {
                missing.push(name.to_string());
            }
        }

        let chain_id = parse_var("CHAIN_ID", DEFAULT_CHAIN_ID)?;
        let token_address = optional_var("TOKEN_CONTRACT_ADDRESS")
            .unwrap_or_else(|| DEFAULT_TOKEN_ADDRESS.to_string());

        let engine = match (operator, engine_url, secret) {
            (Some(operator_address), Some(base_url), Some(secret_key)) => Some(EngineConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                secret_key,
                operator_address,
                token_address,
                chain_id,
            }),
            _ => None,
        };

        let payments = match optional_var("MERCADOPAGO_ACCESS_TOKEN") {
            Some(access_token) => Some(PaymentProviderConfig {
                api_url: optional_var("MERCADOPAGO_API_URL")
                    .unwrap_or_else(|| DEFAULT_MERCADOPAGO_API_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                access_token,
            }),
            None => {
                missing.push("MERCADOPAGO_ACCESS_TOKEN".to_string());
                None
            }
        };

        let public_base_url = optional_var("PUBLIC_BASE_URL")
            .or_else(|| optional_var("NEXT_PUBLIC_URL"))
            .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());

        let defaults = HttpConfig::default();
        let http = HttpConfig {
            timeout: Duration::from_secs(parse_var("MEGABOLSA_HTTP_TIMEOUT_SECS", 15u64)?),
            max_retries: parse_var("MEGABOLSA_HTTP_RETRIES", defaults.max_retries)?,
            retry_delay: defaults.retry_delay,
        };
        if http.timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "MEGABOLSA_HTTP_TIMEOUT_SECS".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        let poller = PollerConfig {
            max_attempts: parse_var("MEGABOLSA_POLL_ATTEMPTS", 15u32)?,
            interval: Duration::from_millis(parse_var("MEGABOLSA_POLL_INTERVAL_MS", 3000u64)?),
        };
        if poller.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "MEGABOLSA_POLL_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            engine,
            payments,
            public_base_url,
            db_path: optional_var("MEGABOLSA_DB_PATH"),
            http,
            poller,
            claim_amount: parse_var("MEGABOLSA_CLAIM_AMOUNT", 100u64)?,
            api_port: parse_var("API_PORT", 3000u16)?,
            log_level: optional_var("MEGABOLSA_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: optional_var("MEGABOLSA_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            missing,
        })
    }

    /// Fail if any required variable was absent
    pub fn require_complete(&self) -> Result<(), ConfigError> {
        match self.missing.as_slice() {
            [] => Ok(()),
            [one] => Err(ConfigError::MissingEnvVar(one.clone())),
            many => Err(ConfigError::MissingEnvVars(many.to_vec())),
        }
    }

    /// Required variables that were absent at load time
    pub fn missing_vars(&self) -> &[String] {
        &self.missing
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== Megabolsa Configuration ===");
        match &self.engine {
            Some(engine) => {
                println!("Engine URL: {}", engine.base_url);
                println!("Operator Wallet: {}", engine.operator_address);
                println!("Token: {} (chain {})", engine.token_address, engine.chain_id);
            }
            None => println!("Engine: NOT CONFIGURED"),
        }
        match &self.payments {
            Some(payments) => println!("Payment Provider: {}", payments.api_url),
            None => println!("Payment Provider: NOT CONFIGURED"),
        }
        println!("Public Base URL: {}", self.public_base_url);
        println!(
            "Storage: {}",
            self.db_path.as_deref().unwrap_or("in-memory (lost on restart)")
        );
        println!(
            "Poller: {} attempts every {} ms",
            self.poller.max_attempts,
            self.poller.interval.as_millis()
        );
        println!("HTTP Timeout: {} s", self.http.timeout.as_secs());
        println!("Log Level: {}", self.log_level);
        println!("================================");
    }
}

/// Read a variable, treating empty values as absent
fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a variable, falling back to `default` when absent
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(name.to_string(), format!("cannot parse {:?}", raw))
        }),
        None => Ok(default),
    }
}
