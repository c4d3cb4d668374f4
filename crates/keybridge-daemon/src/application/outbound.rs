//! Outbound command delivery with bounded retry.
//!
//! A command is attempted up to `retry_count` times.  Success means the
//! transport reported HTTP 200; anything else (another status, timeout,
//! connection refused) is a failed attempt.  A fixed `retry_delay` separates
//! consecutive attempts and is never slept after the last one, so the worst
//! case is `retry_count × request_timeout + (retry_count − 1) × retry_delay`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keybridge_core::OutboundCommand;
use thiserror::Error;
use tracing::{debug, error, warn};

/// HTTP status that counts as delivered.
pub const STATUS_OK: u16 = 200;

/// Error type for a single delivery attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Request(String),
}

/// One delivery attempt to the appliance.
///
/// The production implementation is the reqwest-based `IrccClient`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Sends `command` once and returns the HTTP status.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response was received.
    async fn post(&self, command: &OutboundCommand) -> Result<u16, TransportError>;

    /// Where commands go, for logs and telemetry.
    fn target(&self) -> String;
}

/// Retry settings for [`CommandSender`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.  Zero is treated as one.
    pub retry_count: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Sends commands through a [`CommandTransport`] under a [`RetryPolicy`].
pub struct CommandSender {
    transport: Arc<dyn CommandTransport>,
    policy: RetryPolicy,
}

impl CommandSender {
    pub fn new(transport: Arc<dyn CommandTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn target(&self) -> String {
        self.transport.target()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Delivers `command`, retrying on failure.  Returns `true` as soon as
    /// one attempt gets HTTP 200, `false` once all attempts are used.
    pub async fn send(&self, command: &OutboundCommand) -> bool {
        let attempts = self.policy.retry_count.max(1);

        for attempt in 1..=attempts {
            match self.transport.post(command).await {
                Ok(STATUS_OK) => {
                    debug!(command = %command.command_id, attempt, "command delivered");
                    return true;
                }
                Ok(status) => {
                    warn!(
                        "command {} failed with status {status} (attempt {attempt}/{attempts})",
                        command.command_id
                    );
                }
                Err(e) => {
                    error!(
                        "command {} request failed (attempt {attempt}/{attempts}): {e}",
                        command.command_id
                    );
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }

        false
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
