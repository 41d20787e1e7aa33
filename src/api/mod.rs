//! API Layer Module
//!
//! HTTP server, routes and middleware.

pub mod middleware;
pub mod routes;
pub mod server;

// Re-exports for convenience
pub use middleware::{RateLimitConfig, RateLimiter, RateLimitState};
pub use routes::ErrorResponse;
pub use server::{create_router, start_server, AppState, SharedAppState};
