//! Shiftbot: café shift and equipment-cleaning task bot.
//!
//! Employees' shifts and the recurring cleaning schedule live in a Google
//! spreadsheet. The bot tells each employee which tasks are due before their
//! shift starts and writes completions back to the sheet.
//!
//! # Architecture
//!
//! - **Store**: [`store::RemoteStore`] over the Sheets v4 REST API
//! - **Policy**: pure due-date rules in [`policy`]
//! - **Cache**: [`cache::TaskCache`] holds today's snapshot plus an
//!   optimistic overlay of local completions
//! - **Chat**: Telegram long polling in [`channels`], dispatch in [`bot`]
//! - **Scheduler**: periodic refresh, notifications and digest

pub mod app;
pub mod bot;
pub mod cache;
pub mod channels;
pub mod clock;
pub mod config;
pub mod dates;
pub mod error;
pub mod logging;
pub mod members;
pub mod model;
pub mod policy;
pub mod scheduler;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::{CacheState, TaskCache};
pub use config::BotConfig;
pub use error::{BotError, Result};
pub use model::{Completion, Shift, Task, TaskStatus};
