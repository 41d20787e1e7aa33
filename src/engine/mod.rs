//! Token Engine Module
//!
//! Everything that moves credit tokens on chain.
//!
//! This module contains:
//! - `TokenEngine` trait and the thirdweb Engine HTTP client
//! - Bounded confirmation poller
//! - Mint/burn gateway used by the API flows

pub mod client;
pub mod gateway;
pub mod poller;

// Re-exports for convenience
pub use client::{EngineError, ThirdwebEngineClient, TokenEngine};
pub use gateway::{GatewayError, TokenGateway};
pub use poller::{poll_until, ConfirmationPoller, PollError, PollStep};
