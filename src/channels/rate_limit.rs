//! Rate limiting for proactive outbound messages.
//!
//! Replies to user commands are never throttled; shift notifications, the
//! manager digest and sync-failure reports go through a sliding one-minute
//! window so a burst of shifts cannot trip Telegram's flood control.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiting error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// Rate limit exceeded; must wait before sending.
    #[error("rate limit exceeded; retry after {retry_after_secs}s")]
    Exceeded {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },
}

/// Sliding-window limiter over the last 60 seconds.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_messages_per_minute: u32,
    window: VecDeque<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_messages_per_minute: u32) -> Self {
        Self {
            max_messages_per_minute,
            window: VecDeque::new(),
        }
    }

    /// Try to take a send slot now.
    pub fn try_send(&mut self) -> Result<(), RateLimitError> {
        self.try_send_at(Instant::now())
    }

    /// Try to take a send slot at `now`. Records the send on success.
    pub fn try_send_at(&mut self, now: Instant) -> Result<(), RateLimitError> {
        self.evict(now);

        if self.window.len() >= self.max_messages_per_minute as usize {
            let retry_after_secs = self
                .window
                .front()
                .map(|oldest| WINDOW.saturating_sub(now.duration_since(*oldest)))
                .map_or(WINDOW.as_secs(), |left| left.as_secs().saturating_add(1));
            return Err(RateLimitError::Exceeded { retry_after_secs });
        }

        self.window.push_back(now);
        Ok(())
    }

    /// Slots left in the current window.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        let used = u32::try_from(self.window.len()).unwrap_or(u32::MAX);
        self.max_messages_per_minute.saturating_sub(used)
    }

    fn evict(&mut self, now: Instant) {
        while let Some(first) = self.window.front() {
            if now.duration_since(*first) >= WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}
