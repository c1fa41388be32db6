//! Telegram-facing presentation: message texts and event dispatch.

pub mod format;
pub mod handlers;

pub use handlers::BotService;
