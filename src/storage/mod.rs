//! Storage Layer Module
//!
//! Provides persistence for payment intents, mint records and withdrawals.
//!
//! This module contains:
//! - Storage trait definitions for abstraction
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{PaymentStore, StorageError, StorageResult, WithdrawalStore};
