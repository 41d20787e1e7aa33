//! Transaction Confirmation Poller
//!
//! Bounded fixed-delay polling. `poll_until` is the generic loop; the
//! `ConfirmationPoller` applies it to engine queue ids, treating transport
//! errors as "not yet mined" and an engine-reported failure as terminal.

use std::future::Future;
use std::sync::Arc;

use crate::common::config::PollerConfig;
use crate::types::engine::TxState;

use super::client::TokenEngine;

/// One probe result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    Ready(T),
    Pending,
}

/// Probe up to `config.max_attempts` times, sleeping `config.interval`
/// between probes
///
/// Returns `Ok(Some(_))` on the first ready probe, `Ok(None)` once the
/// ceiling is hit, and `Err` as soon as a probe reports a terminal error.
/// There is no sleep after the last probe.
pub async fn poll_until<T, E, F, Fut>(config: &PollerConfig, mut probe: F) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStep<T>, E>>,
{
    for attempt in 1..=config.max_attempts {
        if let PollStep::Ready(value) = probe(attempt).await? {
            return Ok(Some(value));
        }
        if attempt < config.max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }
    Ok(None)
}

/// Terminal poll failure
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("transaction {queue_id} failed: {reason}")]
    TransactionFailed { queue_id: String, reason: String },
}

/// Waits for engine transactions to be mined
#[derive(Clone)]
pub struct ConfirmationPoller {
    engine: Arc<dyn TokenEngine>,
    config: PollerConfig,
}

impl ConfirmationPoller {
    pub fn new(engine: Arc<dyn TokenEngine>, config: PollerConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// `Ok(true)` once mined, `Ok(false)` if still unconfirmed at the ceiling
    ///
    /// `false` means submitted but unconfirmed, not failed.
    pub async fn await_confirmation(&self, queue_id: &str) -> Result<bool, PollError> {
        let mined = poll_until(&self.config, |attempt| async move {
            match self.engine.transaction_status(queue_id).await {
                Ok(status) => match status.state {
                    TxState::Mined => Ok(PollStep::Ready(())),
                    TxState::Failed => Err(PollError::TransactionFailed {
                        queue_id: queue_id.to_string(),
                        reason: status
                            .error_message
                            .unwrap_or_else(|| "engine reported failure".to_string()),
                    }),
                    TxState::Pending => Ok(PollStep::Pending),
                },
                Err(e) => {
                    tracing::debug!(
                        target: "megabolsa::mint",
                        queue_id,
                        attempt,
                        error = %e,
                        "status check failed, treating as pending"
                    );
                    Ok(PollStep::Pending)
                }
            }
        })
        .await?;

        Ok(mined.is_some())
    }
}
