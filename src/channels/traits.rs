use async_trait::async_trait;
use tokio::sync::mpsc;

pub type ChatId = i64;
pub type MessageId = i64;

/// Chat user that produced an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub user_id: i64,
    /// Public username without `@`, if the user set one.
    pub username: Option<String>,
    pub first_name: String,
}

/// Inbound event received from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A `/command` message. `command` is lowercase without the slash.
    Command {
        chat_id: ChatId,
        sender: Sender,
        command: String,
        args: String,
    },
    /// An inline keyboard button press.
    Callback {
        callback_id: String,
        chat_id: ChatId,
        message_id: MessageId,
        sender: Sender,
        data: String,
    },
}

/// Inline keyboard button carrying callback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

/// Outbound HTML message with an optional inline keyboard (one row per entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub keyboard: Vec<Vec<InlineButton>>,
}

impl OutboundMessage {
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_keyboard(mut self, keyboard: Vec<Vec<InlineButton>>) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// Chat adapter contract. New platforms only need to implement this trait.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// Stable adapter identifier (e.g. `telegram`).
    fn id(&self) -> &'static str;

    /// Send a new message.
    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()>;

    /// Replace the text and keyboard of a message the bot sent earlier.
    async fn edit(&self, message_id: MessageId, message: OutboundMessage) -> anyhow::Result<()>;

    /// Acknowledge a button press, optionally with a toast text.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()>;

    /// Receive inbound events and forward them until the connection fails.
    async fn run(&self, inbound_tx: mpsc::Sender<InboundEvent>) -> anyhow::Result<()>;

    /// Best-effort health probe.
    async fn health_check(&self) -> anyhow::Result<bool>;
}
