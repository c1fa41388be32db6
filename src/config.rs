//! Configuration types for the shift bot.
//!
//! Loaded from a TOML file (every section optional, missing fields fall back
//! to defaults), then overridden from environment variables so secrets can
//! stay out of the file.

use crate::error::{BotError, Result};
use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Telegram Bot API settings.
    pub telegram: TelegramConfig,
    /// Google Sheets settings.
    pub sheets: SheetsConfig,
    /// Refresh and notification timing.
    pub schedule: ScheduleConfig,
    /// Local state (members registry).
    pub storage: StorageConfig,
    /// Log filter and optional file output.
    pub logging: LoggingConfig,
    /// Outbound message throttling.
    pub rate_limit: RateLimitConfig,
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Token issued by BotFather.
    pub bot_token: String,
    /// API base URL (overridable for tests).
    pub api_base_url: String,
    /// Long-polling timeout for `getUpdates`.
    pub poll_timeout_secs: u64,
    /// Timeout for every other Bot API request.
    pub request_timeout_secs: u64,
    /// Telegram user allowed to run admin commands.
    pub admin_user_id: Option<i64>,
    /// Chat that receives digests and sync-failure reports.
    pub manager_chat_id: Option<i64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base_url: "https://api.telegram.org".to_owned(),
            poll_timeout_secs: 30,
            request_timeout_secs: 30,
            admin_user_id: None,
            manager_chat_id: None,
        }
    }
}

/// Google Sheets configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    /// Spreadsheet key from the document URL.
    pub spreadsheet_id: String,
    /// Service-account key file used to mint access tokens.
    pub credentials_file: Option<PathBuf>,
    /// Static OAuth2 bearer token. Takes precedence over `credentials_file`.
    pub access_token: String,
    /// API base URL (overridable for tests).
    pub api_base_url: String,
    /// Worksheet holding the equipment cleaning schedule.
    pub tasks_sheet: String,
    /// Worksheet holding dated shifts.
    pub shifts_sheet: String,
    /// Worksheet holding the employee list.
    pub employees_sheet: String,
    /// Timeout for a single Sheets API request.
    pub request_timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            credentials_file: None,
            access_token: String::new(),
            api_base_url: "https://sheets.googleapis.com".to_owned(),
            tasks_sheet: "График чистки".to_owned(),
            shifts_sheet: "Смены".to_owned(),
            employees_sheet: "Сотрудники".to_owned(),
            request_timeout_secs: 30,
        }
    }
}

/// Largest accepted notification lead, either direction.
pub const MAX_NOTIFICATION_OFFSET_MINUTES: i64 = 24 * 60;

/// Scheduler timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Café timezone as minutes east of UTC (Moscow = 180).
    pub timezone_offset_minutes: i32,
    /// Scheduler tick period.
    pub tick_interval_secs: u64,
    /// How often the cache is refreshed from the sheet.
    pub refresh_interval_secs: u64,
    /// Notify employees this many minutes before their shift starts.
    pub notification_offset_minutes: i64,
    /// Local `HH:MM` at which the manager digest is sent; `None` disables it.
    pub daily_digest_at: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone_offset_minutes: 180,
            tick_interval_secs: 60,
            refresh_interval_secs: 15 * 60,
            notification_offset_minutes: 30,
            daily_digest_at: None,
        }
    }
}

impl ScheduleConfig {
    /// The café timezone. Out-of-range offsets fall back to UTC.
    #[must_use]
    pub fn timezone(&self) -> FixedOffset {
        self.timezone_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Parsed digest time, if configured and valid.
    #[must_use]
    pub fn daily_digest_time(&self) -> Option<NaiveTime> {
        self.daily_digest_at
            .as_deref()
            .and_then(crate::dates::parse_time)
    }
}

/// Local state locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `members.json`.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn members_path(&self) -> PathBuf {
        self.data_dir.join("members.json")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub filter: String,
    /// When set, logs are also written to a daily-rolling file here.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "shiftbot=info,reqwest=warn".to_owned(),
            log_dir: None,
        }
    }
}

/// Outbound message throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Proactive notifications allowed per minute.
    pub messages_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_minute: 20,
        }
    }
}

/// Severity of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

/// Configuration problem surfaced by [`BotConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub id: &'static str,
    pub severity: ConfigSeverity,
    pub summary: String,
}

impl ConfigIssue {
    fn error(id: &'static str, summary: impl Into<String>) -> Self {
        Self {
            id,
            severity: ConfigSeverity::Error,
            summary: summary.into(),
        }
    }

    fn warning(id: &'static str, summary: impl Into<String>) -> Self {
        Self {
            id,
            severity: ConfigSeverity::Warning,
            summary: summary.into(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| BotError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| BotError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `path` when it exists (defaults otherwise), then apply the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or an override does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment-style overrides from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Config`] when a numeric variable does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(id) = get("GOOGLE_SHEETS_ID") {
            self.sheets.spreadsheet_id = id;
        }
        if let Some(path) = get("GOOGLE_CREDENTIALS_FILE") {
            self.sheets.credentials_file = Some(PathBuf::from(path));
        }
        if let Some(token) = get("GOOGLE_SHEETS_TOKEN") {
            self.sheets.access_token = token;
        }
        if let Some(raw) = get("NOTIFICATION_OFFSET_MINUTES") {
            self.schedule.notification_offset_minutes = parse_var("NOTIFICATION_OFFSET_MINUTES", &raw)?;
        }
        if let Some(raw) = get("TIMEZONE_OFFSET_MINUTES") {
            self.schedule.timezone_offset_minutes = parse_var("TIMEZONE_OFFSET_MINUTES", &raw)?;
        }
        if let Some(raw) = get("MANAGER_CHAT_ID") {
            self.telegram.manager_chat_id = Some(parse_var("MANAGER_CHAT_ID", &raw)?);
        }
        if let Some(raw) = get("ADMIN_USER_ID") {
            self.telegram.admin_user_id = Some(parse_var("ADMIN_USER_ID", &raw)?);
        }
        Ok(())
    }

    /// Validate configuration without network calls.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.telegram.bot_token.trim().is_empty() {
            issues.push(ConfigIssue::error(
                "telegram-missing-token",
                "TELEGRAM_BOT_TOKEN not set",
            ));
        }
        if self.sheets.spreadsheet_id.trim().is_empty() {
            issues.push(ConfigIssue::error(
                "sheets-missing-id",
                "GOOGLE_SHEETS_ID not set",
            ));
        }
        match &self.sheets.credentials_file {
            _ if !self.sheets.access_token.trim().is_empty() => {}
            None => issues.push(ConfigIssue::error(
                "sheets-missing-credentials",
                "neither GOOGLE_CREDENTIALS_FILE nor GOOGLE_SHEETS_TOKEN is set",
            )),
            Some(path) if !path.is_file() => issues.push(ConfigIssue::error(
                "sheets-credentials-not-found",
                format!("credentials file {} does not exist", path.display()),
            )),
            Some(_) => {}
        }
        if self.sheets.request_timeout_secs == 0 || self.telegram.request_timeout_secs == 0 {
            issues.push(ConfigIssue::error(
                "http-zero-timeout",
                "request_timeout_secs must be positive",
            ));
        }
        if FixedOffset::east_opt(self.schedule.timezone_offset_minutes.saturating_mul(60)).is_none()
        {
            issues.push(ConfigIssue::error(
                "schedule-bad-timezone",
                format!(
                    "timezone offset {} minutes is out of range",
                    self.schedule.timezone_offset_minutes
                ),
            ));
        }
        if self.schedule.tick_interval_secs == 0 {
            issues.push(ConfigIssue::error(
                "schedule-zero-tick",
                "tick_interval_secs must be positive",
            ));
        }
        let offset_range = -MAX_NOTIFICATION_OFFSET_MINUTES..=MAX_NOTIFICATION_OFFSET_MINUTES;
        if !offset_range.contains(&self.schedule.notification_offset_minutes) {
            issues.push(ConfigIssue::error(
                "schedule-offset-out-of-range",
                format!(
                    "notification offset {} minutes is outside ±{MAX_NOTIFICATION_OFFSET_MINUTES}",
                    self.schedule.notification_offset_minutes
                ),
            ));
        } else if self.schedule.notification_offset_minutes < 0 {
            issues.push(ConfigIssue::warning(
                "schedule-negative-offset",
                "negative notification offset notifies after the shift starts",
            ));
        }
        if self.schedule.daily_digest_at.is_some() && self.schedule.daily_digest_time().is_none() {
            issues.push(ConfigIssue::warning(
                "schedule-bad-digest-time",
                "daily_digest_at is not HH:MM; the digest is disabled",
            ));
        }
        if self.schedule.daily_digest_at.is_some() && self.telegram.manager_chat_id.is_none() {
            issues.push(ConfigIssue::warning(
                "digest-without-manager-chat",
                "daily digest configured but MANAGER_CHAT_ID is not set",
            ));
        }
        if self.rate_limit.messages_per_minute == 0 {
            issues.push(ConfigIssue::warning(
                "rate-limit-zero",
                "messages_per_minute is 0; proactive notifications will never be sent",
            ));
        }

        issues
    }

    /// Fail when [`validate`](Self::validate) reports any error.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Config`] listing every blocking issue.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|issue| issue.severity == ConfigSeverity::Error)
            .map(|issue| issue.summary)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BotError::Config(errors.join("; ")))
        }
    }

    /// Returns the default config file path: `~/.config/shiftbot/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("shiftbot")
            .join("config.toml")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("shiftbot")
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| BotError::Config(format!("{key} must be an integer, got `{raw}`")))
}
