//! In-memory remote store with failure injection.

use super::{RemoteStore, dedupe_shifts};
use crate::dates::SheetDate;
use crate::error::{BotError, Result};
use crate::model::{Completion, Employee, Shift, Task, TaskStatus};
use crate::policy::next_due_after;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    tasks: Vec<Task>,
    shifts: Vec<Shift>,
    employees: Vec<Employee>,
    completions: Vec<Completion>,
}

/// Store that keeps everything in process memory.
///
/// Completions are applied the same way the sheet adapter writes them, so a
/// later `fetch_tasks` reflects them.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fail_fetch: AtomicBool,
    fail_persist: AtomicBool,
    fetch_delay_ms: AtomicUsize,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tasks(self, tasks: Vec<Task>) -> Self {
        self.lock().tasks = tasks;
        self
    }

    #[must_use]
    pub fn with_shifts(self, shifts: Vec<Shift>) -> Self {
        self.lock().shifts = shifts;
        self
    }

    #[must_use]
    pub fn with_employees(self, employees: Vec<Employee>) -> Self {
        self.lock().employees = employees;
        self
    }

    /// Replace the task list (simulates someone editing the sheet).
    pub fn set_tasks(&self, tasks: Vec<Task>) {
        self.lock().tasks = tasks;
    }

    pub fn set_shifts(&self, shifts: Vec<Shift>) {
        self.lock().shifts = shifts;
    }

    pub fn set_employees(&self, employees: Vec<Employee>) {
        self.lock().employees = employees;
    }

    /// Make every fetch fail until reset.
    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Make every completion write fail until reset.
    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    /// Delay each `fetch_tasks` call after it has read the task list, to make
    /// overlapping refreshes observable.
    pub fn set_fetch_delay(&self, delay: Duration) {
        let millis = usize::try_from(delay.as_millis()).unwrap_or(usize::MAX);
        self.fetch_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Completed `fetch_tasks` calls.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of `fetch_tasks` calls that were running at once.
    #[must_use]
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Completions that were successfully persisted.
    #[must_use]
    pub fn completions(&self) -> Vec<Completion> {
        self.lock().completions.clone()
    }

    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_fetch(&self) -> Result<()> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(BotError::Store("injected fetch failure".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    fn id(&self) -> &'static str {
        "memory"
    }

    async fn fetch_tasks(&self) -> Result<Vec<Task>> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        // read at call time, so edits made during the delay land in the next fetch
        let tasks = self.lock().tasks.clone();

        let delay = self.fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_fetch()?;
        Ok(tasks)
    }

    async fn fetch_shifts(&self, date: NaiveDate) -> Result<Vec<Shift>> {
        self.check_fetch()?;
        let shifts = self
            .lock()
            .shifts
            .iter()
            .filter(|shift| shift.date == date)
            .cloned()
            .collect();
        Ok(dedupe_shifts(shifts))
    }

    async fn persist_completion(&self, completion: &Completion) -> Result<bool> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(BotError::Store("injected persist failure".to_owned()));
        }
        let mut state = self.lock();
        let Some(task) = state.tasks.iter_mut().find(|t| t.id == completion.task_id) else {
            return Ok(false);
        };
        let completed_on = completion.completed_at.date_naive();
        task.last_completed_date = SheetDate::Date(completed_on);
        task.next_due_date = next_due_after(completed_on, &completion.period).into();
        task.completed_by = Some(completion.completed_by.clone());
        task.status = TaskStatus::Done;
        state.completions.push(completion.clone());
        Ok(true)
    }

    async fn fetch_employees(&self) -> Result<Vec<Employee>> {
        self.check_fetch()?;
        Ok(self.lock().employees.clone())
    }

    async fn ensure_layout(&self) -> Result<Vec<String>> {
        Ok(vec!["memory store needs no layout".to_owned()])
    }
}
