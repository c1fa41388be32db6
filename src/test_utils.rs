//! Shared test utilities used by unit and integration tests.
//!
//! A manually driven clock, a chat adapter that records everything it is
//! asked to send, and small fixtures.

use crate::channels::traits::{ChatAdapter, InboundEvent, MessageId, OutboundMessage, Sender};
use crate::clock::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, TimeZone};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moscow-time clock at `hour:00` on the given date.
    pub fn moscow(date: NaiveDate, hour: u32) -> Option<Self> {
        let offset = FixedOffset::east_opt(3 * 3600)?;
        let naive = date.and_hms_opt(hour, 0, 0)?;
        offset.from_local_datetime(&naive).single().map(Self::new)
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }

    pub fn advance_days(&self, days: u64) {
        let mut now = lock(&self.now);
        if let Some(later) = now.checked_add_days(Days::new(days)) {
            *now = later;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *lock(&self.now)
    }
}

/// Chat adapter that records outbound traffic and replays scripted events.
#[derive(Debug, Default)]
pub struct RecordingAdapter {
    sent: Mutex<Vec<OutboundMessage>>,
    edited: Mutex<Vec<(MessageId, OutboundMessage)>>,
    answered: Mutex<Vec<String>>,
    scripted: Mutex<Vec<InboundEvent>>,
}

impl RecordingAdapter {
    /// Adapter whose `run` emits `events` once, then idles.
    pub fn with_events(events: Vec<InboundEvent>) -> Self {
        Self {
            scripted: Mutex::new(events),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        lock(&self.sent).clone()
    }

    pub fn edited(&self) -> Vec<(MessageId, OutboundMessage)> {
        lock(&self.edited).clone()
    }

    pub fn answered(&self) -> Vec<String> {
        lock(&self.answered).clone()
    }
}

#[async_trait]
impl ChatAdapter for RecordingAdapter {
    fn id(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()> {
        lock(&self.sent).push(message);
        Ok(())
    }

    async fn edit(&self, message_id: MessageId, message: OutboundMessage) -> anyhow::Result<()> {
        lock(&self.edited).push((message_id, message));
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, _text: Option<&str>) -> anyhow::Result<()> {
        lock(&self.answered).push(callback_id.to_owned());
        Ok(())
    }

    async fn run(&self, inbound_tx: mpsc::Sender<InboundEvent>) -> anyhow::Result<()> {
        let events = std::mem::take(&mut *lock(&self.scripted));
        for event in events {
            inbound_tx.send(event).await?;
        }
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Sender with a username.
pub fn sender(user_id: i64, username: &str) -> Sender {
    Sender {
        user_id,
        username: Some(username.to_owned()),
        first_name: username.to_owned(),
    }
}

/// `/command` event from `sender` in their private chat.
pub fn command(sender: Sender, command: &str) -> InboundEvent {
    InboundEvent::Command {
        chat_id: sender.user_id,
        sender,
        command: command.to_owned(),
        args: String::new(),
    }
}

/// Button press on message `message_id`.
pub fn callback(sender: Sender, message_id: MessageId, data: &str) -> InboundEvent {
    InboundEvent::Callback {
        callback_id: format!("cb-{message_id}-{data}"),
        chat_id: sender.user_id,
        message_id,
        sender,
        data: data.to_owned(),
    }
}
