//! Telegram Bot API contract tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use shiftbot::channels::TelegramAdapter;
use shiftbot::channels::traits::{ChatAdapter, InboundEvent, InlineButton, OutboundMessage};
use shiftbot::config::TelegramConfig;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123:abc";

fn adapter_for(server: &MockServer) -> TelegramAdapter {
    TelegramAdapter::new(&TelegramConfig {
        bot_token: TOKEN.to_owned(),
        api_base_url: server.uri(),
        poll_timeout_secs: 0,
        ..TelegramConfig::default()
    })
}

fn method_path(name: &str) -> String {
    format!("/bot{TOKEN}/{name}")
}

fn ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": result }))
}

#[tokio::test]
async fn send_posts_html_message_with_inline_keyboard() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(method_path("sendMessage")))
        .and(body_partial_json(json!({
            "chat_id": 42,
            "text": "<b>Гриль</b>",
            "parse_mode": "HTML",
            "reply_markup": {
                "inline_keyboard": [[
                    { "text": "✅ Выполнено: Гриль", "callback_data": "complete_2" }
                ]]
            }
        })))
        .respond_with(ok(json!({ "message_id": 1, "chat": { "id": 42 } })))
        .expect(1)
        .mount(&server)
        .await;

    let message = OutboundMessage::text(42, "<b>Гриль</b>").with_keyboard(vec![vec![InlineButton {
        text: "✅ Выполнено: Гриль".to_owned(),
        callback_data: "complete_2".to_owned(),
    }]]);
    adapter_for(&server).send(message).await.unwrap();
}

#[tokio::test]
async fn api_error_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(method_path("sendMessage")))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .mount(&server)
        .await;

    let err = adapter_for(&server)
        .send(OutboundMessage::text(42, "hi"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("blocked by the user"), "{err}");
}

#[tokio::test]
async fn stalled_send_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(method_path("sendMessage")))
        .respond_with(ok(json!({ "message_id": 1 })).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let adapter = TelegramAdapter::new(&TelegramConfig {
        bot_token: TOKEN.to_owned(),
        api_base_url: server.uri(),
        request_timeout_secs: 1,
        ..TelegramConfig::default()
    });
    let started = std::time::Instant::now();
    assert!(adapter.send(OutboundMessage::text(42, "hi")).await.is_err());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn edit_targets_message_and_tolerates_unchanged_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(method_path("editMessageText")))
        .and(body_partial_json(json!({ "chat_id": 42, "message_id": 7 })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message is not modified"
        })))
        .expect(1)
        .mount(&server)
        .await;

    adapter_for(&server)
        .edit(7, OutboundMessage::text(42, "same"))
        .await
        .unwrap();
}

#[tokio::test]
async fn answer_callback_acknowledges_query() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(method_path("answerCallbackQuery")))
        .and(body_partial_json(json!({ "callback_query_id": "cb-1" })))
        .respond_with(ok(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    adapter_for(&server)
        .answer_callback("cb-1", None)
        .await
        .unwrap();
}

#[tokio::test]
async fn health_check_calls_get_me() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(method_path("getMe")))
        .respond_with(ok(json!({ "id": 123, "is_bot": true, "first_name": "Cafe" })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(adapter_for(&server).health_check().await.unwrap());
}

#[tokio::test]
async fn health_check_without_token_skips_network() {
    let adapter = TelegramAdapter::new(&TelegramConfig::default());
    assert!(!adapter.health_check().await.unwrap());
}

#[tokio::test]
async fn long_poll_forwards_events_and_advances_offset() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(method_path("getUpdates")))
        .and(body_partial_json(json!({ "offset": 0 })))
        .respond_with(ok(json!([
            {
                "update_id": 100,
                "message": {
                    "message_id": 1,
                    "chat": { "id": 7 },
                    "from": { "id": 7, "first_name": "Анна", "username": "Anna" },
                    "text": "/tasks@cafe_bot"
                }
            },
            {
                "update_id": 101,
                "message": {
                    "message_id": 2,
                    "chat": { "id": 7 },
                    "from": { "id": 7, "first_name": "Анна", "username": "Anna" },
                    "text": "спасибо"
                }
            },
            {
                "update_id": 102,
                "callback_query": {
                    "id": "q1",
                    "from": { "id": 7, "first_name": "Анна", "username": "Anna" },
                    "message": { "message_id": 55, "chat": { "id": 7 } },
                    "data": "complete_3"
                }
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(method_path("getUpdates")))
        .and(body_partial_json(json!({ "offset": 103 })))
        .respond_with(ok(json!([])).set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let adapter = adapter_for(&server);
    let (tx, mut rx) = mpsc::channel(8);
    let poller = async {
        let _ = adapter.run(tx).await;
    };
    let collect = async {
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        (first, second)
    };

    let (first, second) = tokio::select! {
        () = poller => panic!("poll loop ended early"),
        events = collect => events,
    };

    match first {
        InboundEvent::Command {
            chat_id,
            command,
            sender,
            ..
        } => {
            assert_eq!(chat_id, 7);
            assert_eq!(command, "tasks");
            assert_eq!(sender.username.as_deref(), Some("Anna"));
        }
        other => panic!("expected command, got {other:?}"),
    }
    match second {
        InboundEvent::Callback {
            callback_id,
            message_id,
            data,
            ..
        } => {
            assert_eq!(callback_id, "q1");
            assert_eq!(message_id, 55);
            assert_eq!(data, "complete_3");
        }
        other => panic!("expected callback, got {other:?}"),
    }
}

#[tokio::test]
async fn run_refuses_empty_token() {
    let adapter = TelegramAdapter::new(&TelegramConfig::default());
    let (tx, _rx) = mpsc::channel(1);
    assert!(adapter.run(tx).await.is_err());
}
