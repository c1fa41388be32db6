//! Remote task store: the spreadsheet that holds tasks, shifts and employees.
//!
//! Implementations are pluggable. [`SheetsStore`] talks to the Google Sheets
//! REST API; [`InMemoryStore`] backs tests and dry runs.

pub mod auth;
pub mod memory;
pub mod sheets;

use crate::error::Result;
use crate::model::{Completion, Employee, Shift, Task};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;

pub use memory::InMemoryStore;
pub use sheets::SheetsStore;

/// Remote source of truth contract. Every call may fail transiently.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Stable store identifier for logs (e.g. `sheets`).
    fn id(&self) -> &'static str;

    /// All recurring tasks.
    async fn fetch_tasks(&self) -> Result<Vec<Task>>;

    /// Shifts scheduled on `date`, at most one per employee.
    async fn fetch_shifts(&self, date: NaiveDate) -> Result<Vec<Shift>>;

    /// Record a completion. `Ok(false)` means the store rejected the write
    /// (unknown row, missing column) without a transport failure.
    async fn persist_completion(&self, completion: &Completion) -> Result<bool>;

    /// Employee roster used to seed the members registry.
    async fn fetch_employees(&self) -> Result<Vec<Employee>>;

    /// Create missing header rows. Returns one report line per worksheet.
    async fn ensure_layout(&self) -> Result<Vec<String>>;
}

/// Keep the first shift per employee handle, dropping later duplicates.
pub(crate) fn dedupe_shifts(shifts: Vec<Shift>) -> Vec<Shift> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(shifts.len());
    for shift in shifts {
        if seen.insert((shift.user_handle.clone(), shift.date)) {
            unique.push(shift);
        } else {
            tracing::warn!(
                handle = %shift.user_handle,
                date = %shift.date,
                "duplicate shift ignored"
            );
        }
    }
    unique
}
