use crate::channels::traits::{
    ChatAdapter, InboundEvent, InlineButton, MessageId, OutboundMessage, Sender,
};
use crate::config::TelegramConfig;
use crate::error::BotError;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    message: Option<Message>,
    data: Option<String>,
}

impl User {
    fn into_sender(self) -> Sender {
        Sender {
            user_id: self.id,
            username: self.username.filter(|u| !u.trim().is_empty()),
            first_name: self.first_name,
        }
    }
}

/// Telegram Bot API adapter using `getUpdates` long polling.
pub struct TelegramAdapter {
    bot_token: String,
    api_base_url: String,
    poll_timeout_secs: u64,
    next_offset: AtomicI64,
    client: reqwest::Client,
}

impl TelegramAdapter {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            poll_timeout_secs: config.poll_timeout_secs,
            next_offset: AtomicI64::new(0),
            // getUpdates overrides this per request with the long-poll timeout.
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_default(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base_url, self.bot_token)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
        timeout: Option<Duration>,
    ) -> anyhow::Result<T> {
        let mut request = self.client.post(self.method_url(method)).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        let parsed: ApiResponse<T> = response.json().await?;
        if !parsed.ok {
            let description = parsed.description.unwrap_or_default();
            return Err(BotError::Channel(format!(
                "telegram {method} failed ({status}): {description}"
            ))
            .into());
        }
        parsed.result.ok_or_else(|| {
            BotError::Channel(format!("telegram {method} returned no result")).into()
        })
    }

    fn keyboard_json(keyboard: &[Vec<InlineButton>]) -> Value {
        let rows: Vec<Vec<Value>> = keyboard
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| json!({ "text": b.text, "callback_data": b.callback_data }))
                    .collect()
            })
            .collect();
        json!({ "inline_keyboard": rows })
    }

    fn message_body(message: &OutboundMessage) -> Value {
        let mut body = json!({
            "chat_id": message.chat_id,
            "text": message.text,
            "parse_mode": "HTML",
        });
        if !message.keyboard.is_empty() {
            body["reply_markup"] = Self::keyboard_json(&message.keyboard);
        }
        body
    }

    /// Split `/tasks@my_bot extra` into (`tasks`, `extra`).
    fn parse_command(text: &str) -> Option<(String, String)> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let command = head.split('@').next().unwrap_or(head).to_lowercase();
        if command.is_empty() {
            return None;
        }
        Some((command, args.trim().to_owned()))
    }

    fn into_event(update: Update) -> Option<InboundEvent> {
        if let Some(query) = update.callback_query {
            let message = query.message?;
            return Some(InboundEvent::Callback {
                callback_id: query.id,
                chat_id: message.chat.id,
                message_id: message.message_id,
                sender: query.from.into_sender(),
                data: query.data.unwrap_or_default(),
            });
        }

        let message = update.message?;
        let (command, args) = Self::parse_command(message.text.as_deref()?)?;
        Some(InboundEvent::Command {
            chat_id: message.chat.id,
            sender: message.from?.into_sender(),
            command,
            args,
        })
    }
}

#[async_trait]
impl ChatAdapter for TelegramAdapter {
    fn id(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()> {
        let _: Value = self
            .call("sendMessage", Self::message_body(&message), None)
            .await?;
        Ok(())
    }

    async fn edit(&self, message_id: MessageId, message: OutboundMessage) -> anyhow::Result<()> {
        let mut body = Self::message_body(&message);
        body["message_id"] = json!(message_id);
        match self.call::<Value>("editMessageText", body, None).await {
            Ok(_) => Ok(()),
            // Re-rendering an unchanged list is not a failure.
            Err(err) if err.to_string().contains("message is not modified") => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        let _: Value = self.call("answerCallbackQuery", body, None).await?;
        Ok(())
    }

    async fn run(&self, inbound_tx: mpsc::Sender<InboundEvent>) -> anyhow::Result<()> {
        if self.bot_token.trim().is_empty() {
            anyhow::bail!("telegram bot token is empty");
        }

        let http_timeout = Duration::from_secs(self.poll_timeout_secs.saturating_add(10));
        loop {
            let body = json!({
                "offset": self.next_offset.load(Ordering::SeqCst),
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            });
            let updates: Vec<Update> = self.call("getUpdates", body, Some(http_timeout)).await?;

            for update in updates {
                self.next_offset
                    .fetch_max(update.update_id + 1, Ordering::SeqCst);
                let Some(event) = Self::into_event(update) else {
                    continue;
                };
                if inbound_tx.send(event).await.is_err() {
                    anyhow::bail!("telegram inbound channel closed");
                }
            }
        }
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        if self.bot_token.trim().is_empty() {
            return Ok(false);
        }
        let me: Value = self.call("getMe", json!({}), None).await?;
        Ok(me.get("id").is_some())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn commands_strip_bot_mention_and_args() {
        assert_eq!(
            TelegramAdapter::parse_command("/Tasks@cafe_bot now"),
            Some(("tasks".to_owned(), "now".to_owned()))
        );
        assert_eq!(
            TelegramAdapter::parse_command("/start"),
            Some(("start".to_owned(), String::new()))
        );
        assert_eq!(TelegramAdapter::parse_command("hello"), None);
        assert_eq!(TelegramAdapter::parse_command("/"), None);
    }

    #[test]
    fn callback_update_becomes_event() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 10,
            "callback_query": {
                "id": "cb1",
                "from": { "id": 7, "first_name": "Анна", "username": "anna" },
                "message": { "message_id": 55, "chat": { "id": 7 } },
                "data": "complete_5"
            }
        }))
        .unwrap();
        match TelegramAdapter::into_event(update) {
            Some(InboundEvent::Callback {
                message_id, data, sender, ..
            }) => {
                assert_eq!(message_id, 55);
                assert_eq!(data, "complete_5");
                assert_eq!(sender.username.as_deref(), Some("anna"));
            }
            other => unreachable!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn plain_text_is_ignored() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 11,
            "message": {
                "message_id": 1,
                "chat": { "id": 7 },
                "from": { "id": 7, "first_name": "Анна" },
                "text": "привет"
            }
        }))
        .unwrap();
        assert!(TelegramAdapter::into_event(update).is_none());
    }

    #[test]
    fn keyboard_is_rendered_as_inline_markup() {
        let message = OutboundMessage::text(1, "x").with_keyboard(vec![vec![InlineButton {
            text: "✅ Выполнено".to_owned(),
            callback_data: "complete_2".to_owned(),
        }]]);
        let body = TelegramAdapter::message_body(&message);
        assert_eq!(body["parse_mode"], "HTML");
        assert_eq!(
            body["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "complete_2"
        );
    }
}
