//! Bearer tokens for the Sheets API.
//!
//! A static token from config wins. Otherwise tokens are minted from a
//! service-account key; `gcp_auth` caches them and renews before expiry.

use crate::config::SheetsConfig;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use std::path::Path;
use std::sync::Arc;

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Source of the `Authorization: Bearer` value, asked once per request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer(&self) -> Result<String>;
}

/// Fixed token, e.g. from `GOOGLE_SHEETS_TOKEN`.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Service-account key file, as downloaded from the cloud console.
pub struct ServiceAccount {
    account: CustomServiceAccount,
}

impl ServiceAccount {
    /// # Errors
    ///
    /// Returns [`BotError::Auth`] when the key file is unreadable or malformed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let account = CustomServiceAccount::from_file(path)
            .map_err(|e| BotError::Auth(format!("cannot load {}: {e}", path.display())))?;
        Ok(Self { account })
    }
}

#[async_trait]
impl TokenSource for ServiceAccount {
    async fn bearer(&self) -> Result<String> {
        let token = self
            .account
            .token(&[SPREADSHEETS_SCOPE])
            .await
            .map_err(|e| BotError::Auth(format!("cannot mint access token: {e}")))?;
        Ok(token.as_str().to_owned())
    }
}

/// Pick the token source configured for `config`.
///
/// # Errors
///
/// Returns an error when no credentials are configured or the key file
/// cannot be loaded.
pub fn token_source(config: &SheetsConfig) -> Result<Arc<dyn TokenSource>> {
    let token = config.access_token.trim();
    if !token.is_empty() {
        return Ok(Arc::new(StaticToken::new(token)));
    }
    match &config.credentials_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "using service-account credentials");
            Ok(Arc::new(ServiceAccount::from_file(path)?))
        }
        None => Err(BotError::Config(
            "no Sheets credentials: set GOOGLE_CREDENTIALS_FILE or GOOGLE_SHEETS_TOKEN".to_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[tokio::test]
    async fn static_token_wins_over_key_file() {
        let config = SheetsConfig {
            access_token: " ya29.static ".to_owned(),
            credentials_file: Some("/nonexistent/key.json".into()),
            ..SheetsConfig::default()
        };
        let source = token_source(&config).unwrap();
        assert_eq!(source.bearer().await.unwrap(), "ya29.static");
    }

    #[test]
    fn missing_credentials_are_a_config_error() {
        let err = token_source(&SheetsConfig::default()).err().unwrap();
        assert!(matches!(err, BotError::Config(_)));
    }

    #[test]
    fn unreadable_key_file_is_an_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key.json");
        std::fs::write(&key, "not json").unwrap();

        let config = SheetsConfig {
            credentials_file: Some(key),
            ..SheetsConfig::default()
        };
        let err = token_source(&config).err().unwrap();
        assert!(matches!(err, BotError::Auth(_)), "{err}");

        let missing = SheetsConfig {
            credentials_file: Some(dir.path().join("absent.json")),
            ..SheetsConfig::default()
        };
        assert!(matches!(token_source(&missing).err().unwrap(), BotError::Auth(_)));
    }
}
