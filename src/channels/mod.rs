//! Chat platform integration (Telegram).
//!
//! Adapters are pluggable through [`ChatAdapter`]. This module owns the
//! restart loop around an adapter and the throttled path used for
//! messages the bot sends on its own initiative.

pub mod rate_limit;
pub mod telegram;
pub mod traits;

use crate::channels::rate_limit::{RateLimitError, RateLimiter};
use crate::channels::traits::{ChatAdapter, InboundEvent, OutboundMessage};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use telegram::TelegramAdapter;

const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

/// Keep `adapter.run` alive until `cancel` fires, restarting it with
/// exponential backoff (2s doubling up to 60s) whenever it returns.
pub async fn supervise_adapter(
    adapter: Arc<dyn ChatAdapter>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    cancel: CancellationToken,
) {
    let mut backoff_secs = INITIAL_BACKOFF_SECS;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = adapter.run(inbound_tx.clone()) => result,
        };
        match result {
            Ok(()) => {
                tracing::warn!(adapter = adapter.id(), "chat adapter stopped; restarting");
                backoff_secs = INITIAL_BACKOFF_SECS;
            }
            Err(err) => {
                tracing::warn!(
                    adapter = adapter.id(),
                    "chat adapter failed: {err}; retrying in {backoff_secs}s"
                );
            }
        }
        if inbound_tx.is_closed() {
            tracing::info!(adapter = adapter.id(), "inbound queue closed, stopping adapter");
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
        }
        backoff_secs = backoff_secs.saturating_mul(2).min(MAX_BACKOFF_SECS);
    }
    tracing::info!(adapter = adapter.id(), "chat adapter supervisor stopped");
}

/// Outcome of a proactive send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    /// Dropped by the rate limiter; the caller may try again later.
    Throttled { retry_after_secs: u64 },
}

/// Rate-limited sender for notifications, digests and reports.
pub struct Notifier {
    adapter: Arc<dyn ChatAdapter>,
    limiter: Mutex<RateLimiter>,
}

impl Notifier {
    pub fn new(adapter: Arc<dyn ChatAdapter>, messages_per_minute: u32) -> Self {
        Self {
            adapter,
            limiter: Mutex::new(RateLimiter::new(messages_per_minute)),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn ChatAdapter> {
        &self.adapter
    }

    /// Send `message` unless the per-minute budget is exhausted.
    pub async fn notify(&self, message: OutboundMessage) -> anyhow::Result<NotifyOutcome> {
        let permit = self
            .limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_send();
        match permit {
            Ok(()) => {
                let chat_id = message.chat_id;
                self.adapter.send(message).await?;
                tracing::debug!(chat_id, "notification sent");
                Ok(NotifyOutcome::Sent)
            }
            Err(RateLimitError::Exceeded { retry_after_secs }) => {
                tracing::warn!(
                    chat_id = message.chat_id,
                    retry_after_secs,
                    "notification rate limited"
                );
                Ok(NotifyOutcome::Throttled { retry_after_secs })
            }
        }
    }
}
