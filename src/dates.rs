//! Sheet date and period parsing.
//!
//! Spreadsheet cells carry dates as `dd.mm.yyyy` text, with `-` or an empty
//! cell meaning "no date". [`SheetDate`] keeps the three cases apart so the
//! due-date policy can treat an unparseable value differently from a blank
//! one.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker the sheet uses for "no value".
pub const EMPTY_MARKER: &str = "-";

/// Date format written to and read from the sheet.
pub const SHEET_DATE_FORMAT: &str = "%d.%m.%Y";

/// A date cell as read from the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SheetDate {
    /// Blank cell or the `-` marker.
    #[default]
    Empty,
    /// A parsed calendar date.
    Date(NaiveDate),
    /// Text that is not a recognised date.
    Invalid(String),
}

impl SheetDate {
    /// Parse a cell value. Accepts `dd.mm.yyyy` and `yyyy-mm-dd`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == EMPTY_MARKER {
            return Self::Empty;
        }
        match parse_date(trimmed) {
            Some(date) => Self::Date(date),
            None => Self::Invalid(trimmed.to_owned()),
        }
    }

    /// The parsed date, if any.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            Self::Empty | Self::Invalid(_) => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<NaiveDate> for SheetDate {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

impl From<Option<NaiveDate>> for SheetDate {
    fn from(date: Option<NaiveDate>) -> Self {
        date.map_or(Self::Empty, Self::Date)
    }
}

impl From<String> for SheetDate {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<SheetDate> for String {
    fn from(value: SheetDate) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SheetDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str(EMPTY_MARKER),
            Self::Date(date) => write!(f, "{}", format_date(*date)),
            Self::Invalid(raw) => f.write_str(raw),
        }
    }
}

/// Parse a date in sheet (`dd.mm.yyyy`) or ISO (`yyyy-mm-dd`) form.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, SHEET_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Format a date the way the sheet stores it.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(SHEET_DATE_FORMAT).to_string()
}

/// Parse a shift time such as `08:00` or `8:30`.
#[must_use]
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

/// Extract a day count from a free-text period such as `7 дней` or `every 14 days`.
///
/// Takes the first run of ASCII digits. Returns `None` when there is no
/// number or the number is zero.
#[must_use]
pub fn parse_period_days(period: &str) -> Option<u32> {
    let digits: String = period
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse::<u32>().ok().filter(|days| *days > 0)
}
