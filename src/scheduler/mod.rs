//! Background job scheduler.
//!
//! Refreshes the task cache from the sheet, sends employees their tasks
//! ahead of a shift, and posts the manager's daily digest.

pub mod runner;
pub mod tasks;

pub use runner::Scheduler;
pub use tasks::{JobOutcome, Schedule, ScheduledJob};
