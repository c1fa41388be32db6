//! Error types for the shift bot.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Configuration missing or invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Remote task store (spreadsheet) failure.
    #[error("store error: {0}")]
    Store(String),

    /// Remote store answered with a non-success HTTP status.
    #[error("store request failed ({status}): {message}")]
    StoreStatus { status: u16, message: String },

    /// Credentials could not be loaded or a token could not be minted.
    #[error("auth error: {0}")]
    Auth(String),

    /// Chat channel failure (send, poll, edit).
    #[error("channel error: {0}")]
    Channel(String),

    /// Members registry failure.
    #[error("members error: {0}")]
    Members(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BotError>;
