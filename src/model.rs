//! Domain types: cleaning tasks, shifts, employees and completions.

use crate::dates::SheetDate;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Stable identifier of a task within a snapshot (its sheet row).
pub type TaskId = u32;

/// Status text the sheet uses for a completed task.
pub const DONE_MARK: &str = "✅";

/// Status text the sheet uses for a pending task.
pub const PENDING_MARK: &str = "⏳";

/// Completion status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Done,
}

impl TaskStatus {
    /// Interpret a status cell. Only the done mark counts as done.
    #[must_use]
    pub fn from_cell(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == DONE_MARK || raw.eq_ignore_ascii_case("done") {
            Self::Done
        } else {
            Self::Pending
        }
    }

    #[must_use]
    pub fn mark(self) -> &'static str {
        match self {
            Self::Pending => PENDING_MARK,
            Self::Done => DONE_MARK,
        }
    }
}

/// A recurring cleaning or maintenance item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// Free-text periodicity, e.g. `7 дней`.
    pub period: String,
    #[serde(default)]
    pub last_completed_date: SheetDate,
    #[serde(default)]
    pub next_due_date: SheetDate,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub completed_by: Option<String>,
    /// Set only by the local completion overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<FixedOffset>>,
}

impl Task {
    /// A pending task that has never been cleaned.
    pub fn new(id: TaskId, name: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            period: period.into(),
            last_completed_date: SheetDate::Empty,
            next_due_date: SheetDate::Empty,
            status: TaskStatus::Pending,
            completed_by: None,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn with_last_completed(mut self, date: impl Into<SheetDate>) -> Self {
        self.last_completed_date = date.into();
        self
    }

    #[must_use]
    pub fn with_next_due(mut self, date: impl Into<SheetDate>) -> Self {
        self.next_due_date = date.into();
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_completed_by(mut self, who: impl Into<String>) -> Self {
        self.completed_by = Some(who.into());
        self
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}

/// An employee's working interval on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub employee_name: String,
    /// Normalized chat handle (see [`normalize_handle`]).
    pub user_handle: String,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub date: NaiveDate,
}

impl Shift {
    pub fn new(
        employee_name: impl Into<String>,
        user_handle: &str,
        date: NaiveDate,
    ) -> Self {
        Self {
            employee_name: employee_name.into(),
            user_handle: normalize_handle(user_handle),
            start_time: None,
            end_time: None,
            date,
        }
    }

    #[must_use]
    pub fn with_times(mut self, start: Option<NaiveTime>, end: Option<NaiveTime>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// First word of the employee name, used in greetings.
    #[must_use]
    pub fn first_name(&self) -> &str {
        self.employee_name
            .split_whitespace()
            .next()
            .unwrap_or(self.employee_name.as_str())
    }
}

/// A row of the employees sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub name: String,
    pub handle: String,
    #[serde(default)]
    pub position: Option<String>,
}

/// Payload pushed to the remote store when a task is completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub task_id: TaskId,
    pub completed_by: String,
    pub completed_at: DateTime<FixedOffset>,
    pub period: String,
}

/// Strip a leading `@`, trim and lowercase a chat handle.
#[must_use]
pub fn normalize_handle(raw: &str) -> String {
    raw.trim().trim_start_matches('@').trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn status_cell_parsing() {
        assert_eq!(TaskStatus::from_cell("✅"), TaskStatus::Done);
        assert_eq!(TaskStatus::from_cell(" ✅ "), TaskStatus::Done);
        assert_eq!(TaskStatus::from_cell("⏳"), TaskStatus::Pending);
        assert_eq!(TaskStatus::from_cell(""), TaskStatus::Pending);
    }

    #[test]
    fn handles_are_normalized() {
        assert_eq!(normalize_handle("@Anna_Barista "), "anna_barista");
        assert_eq!(normalize_handle("ivan"), "ivan");
    }

    #[test]
    fn shift_first_name() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let shift = Shift::new("Сидорова Анна", "@anna", date);
        assert_eq!(shift.first_name(), "Сидорова");
        assert_eq!(shift.user_handle, "anna");
    }

    #[test]
    fn task_serde_keeps_sheet_dates_as_text() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let task = Task::new(2, "Гриль", "7 дней").with_last_completed(date);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["last_completed_date"], "01.01.2024");
        assert_eq!(json["next_due_date"], "-");
        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }
}
