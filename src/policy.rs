//! Due-date policy for recurring cleaning tasks.
//!
//! Pure functions only. The policy is total: ambiguous data resolves to
//! "not due" so that broken rows do not spam employees, with the single
//! exception of a task that has never been cleaned.

use crate::dates::{SheetDate, parse_period_days};
use crate::model::Task;
use chrono::{Days, NaiveDate};

/// Decide whether `task` must be surfaced as due on `reference`.
#[must_use]
pub fn is_due(task: &Task, reference: NaiveDate) -> bool {
    // A task finished today stays hidden until the next refresh recomputes
    // its next-due date.
    if task.is_done() && task.last_completed_date.date() == Some(reference) {
        return false;
    }

    match &task.next_due_date {
        SheetDate::Date(next) => return *next <= reference,
        SheetDate::Invalid(_) => return false,
        SheetDate::Empty => {}
    }

    let Some(last) = task.last_completed_date.date() else {
        return true;
    };

    match parse_period_days(&task.period) {
        Some(period) => days_between(last, reference) >= i64::from(period),
        None => false,
    }
}

/// Date on which the task first became (or becomes) due, when computable.
#[must_use]
pub fn due_since(task: &Task) -> Option<NaiveDate> {
    if let Some(next) = task.next_due_date.date() {
        return Some(next);
    }
    let last = task.last_completed_date.date()?;
    next_due_after(last, &task.period)
}

/// Whole days a due task is past its due date; `0` when due today or unknown.
#[must_use]
pub fn days_overdue(task: &Task, reference: NaiveDate) -> i64 {
    due_since(task)
        .map(|since| days_between(since, reference))
        .filter(|days| *days > 0)
        .unwrap_or(0)
}

#[must_use]
pub fn is_overdue(task: &Task, reference: NaiveDate) -> bool {
    days_overdue(task, reference) > 0
}

/// Next-due date written back after a completion on `completed_on`.
#[must_use]
pub fn next_due_after(completed_on: NaiveDate, period: &str) -> Option<NaiveDate> {
    let days = parse_period_days(period)?;
    completed_on.checked_add_days(Days::new(u64::from(days)))
}

fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}
