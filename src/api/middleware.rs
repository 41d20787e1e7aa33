//! API Middleware - Rate Limiting, Security Headers and Request Logging
//!
//! Provides the request-path middleware for the Megabolsa API:
//! - Rate limiting per client IP
//! - Security headers on every response
//! - Correlation ids and latency logging

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::common::logging::{generate_correlation_id, log_api_response, log_security_event};

/// Header carrying the request correlation id
pub const CORRELATION_HEADER: &str = "x-correlation-id";

// ============================================================================
// Rate Limiting
// ============================================================================

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
    /// Burst allowance (extra requests allowed temporarily)
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            burst: 20,
        }
    }
}

impl RateLimitConfig {
    /// Stricter config for the free token grant
    pub fn strict() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            burst: 5,
        }
    }
}

/// Rate limit entry for a single client
#[derive(Debug, Clone)]
struct RateLimitEntry {
    /// Number of requests in current window
    count: u32,
    window_start: Instant,
    /// Burst tokens available
    burst_tokens: u32,
}

/// In-memory rate limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: RwLock<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Check if a request is allowed for the given client ID
    pub async fn check(&self, client_id: &str) -> Result<(), RateLimitError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let entry = entries.entry(client_id.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
            burst_tokens: self.config.burst,
        });

        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
            // Burst refills slowly
            entry.burst_tokens = self.config.burst.min(entry.burst_tokens + 5);
        }

        if entry.count < self.config.max_requests {
            entry.count += 1;
            Ok(())
        } else if entry.burst_tokens > 0 {
            entry.burst_tokens -= 1;
            entry.count += 1;
            Ok(())
        } else {
            let retry_after = self
                .config
                .window
                .saturating_sub(now.duration_since(entry.window_start))
                .as_secs()
                .max(1);
            Err(RateLimitError::Exceeded { retry_after })
        }
    }

    /// Drop entries idle for two windows
    pub async fn cleanup(&self) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let expiry = self.config.window * 2;

        entries.retain(|_, entry| now.duration_since(entry.window_start) < expiry);
    }

    pub async fn tracked_clients(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[derive(Debug)]
pub enum RateLimitError {
    Exceeded { retry_after: u64 },
}

/// Shared rate limiter state
pub type RateLimitState = Arc<RateLimiter>;

pub fn create_rate_limiter(config: RateLimitConfig) -> RateLimitState {
    Arc::new(RateLimiter::new(config))
}

/// Extract client IP from request headers
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    // Proxied requests: first hop in X-Forwarded-For
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            let first = value.split(',').next()?.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            return Some(value.trim().to_string());
        }
    }

    None
}

/// Body of a 429 response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRejection {
    pub error: String,
    pub code: String,
    pub retry_after: u64,
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let retry_after = HeaderValue::from(self.retry_after);
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(self)).into_response();
        response.headers_mut().insert(header::RETRY_AFTER, retry_after);
        response
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimitState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitRejection> {
    let client_id = extract_client_ip(&headers).unwrap_or_else(|| "unknown".to_string());

    match rate_limiter.check(&client_id).await {
        Ok(()) => Ok(next.run(request).await),
        Err(RateLimitError::Exceeded { retry_after }) => {
            log_security_event(
                "rate_limited",
                serde_json::json!({
                    "client": client_id,
                    "path": request.uri().path(),
                    "retry_after": retry_after,
                }),
                None,
            );
            Err(RateLimitRejection {
                error: "Rate limit exceeded".to_string(),
                code: "RATE_LIMITED".to_string(),
                retry_after,
            })
        }
    }
}

// ============================================================================
// Response Middleware
// ============================================================================

/// Security headers middleware
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-XSS-Protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

/// Tag each request with a correlation id and log its outcome
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 64)
        .map(str::to_string)
        .unwrap_or_else(generate_correlation_id);

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    log_api_response(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_millis() as u64,
        &correlation_id,
    );
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }

    response
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter() {
        let config = RateLimitConfig {
            max_requests: 3,
            window: Duration::from_secs(1),
            burst: 1,
        };
        let limiter = RateLimiter::new(config);

        assert!(limiter.check("client1").await.is_ok());
        assert!(limiter.check("client1").await.is_ok());
        assert!(limiter.check("client1").await.is_ok());

        // 4th uses burst
        assert!(limiter.check("client1").await.is_ok());

        match limiter.check("client1").await {
            Err(RateLimitError::Exceeded { retry_after }) => assert!(retry_after >= 1),
            Ok(()) => panic!("5th request should be limited"),
        }

        assert!(limiter.check("client2").await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_clients() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(5),
            burst: 0,
        });
        limiter.check("a").await.unwrap();
        assert_eq!(limiter.tracked_clients().await, 1);

        tokio::time::sleep(Duration::from_millis(15)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_clients().await, 0);
    }

    #[test]
    fn test_extract_client_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers), None);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("10.0.0.2"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }
}
