//! Scheduled job definitions.
//!
//! Defines the [`ScheduledJob`] type and the [`Schedule`] enum for timing.
//! Times are evaluated in the café's local timezone.

use chrono::{DateTime, FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

/// Job that pulls the sheet into the task cache.
pub const JOB_REFRESH_CACHE: &str = "refresh_cache";

/// Job that sends employees their tasks before a shift.
pub const JOB_NOTIFY_SHIFTS: &str = "notify_shifts";

/// Job that sends the manager a daily summary.
pub const JOB_DAILY_DIGEST: &str = "daily_digest";

/// How often a job should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Run every N seconds. `0` means every tick.
    Interval {
        /// Interval in seconds between runs.
        secs: u64,
    },
    /// Run once daily at a given local hour and minute.
    Daily {
        /// Hour of day (0-23).
        hour: u8,
        /// Minute of hour (0-59).
        min: u8,
    },
}

impl Schedule {
    /// Daily schedule at a parsed local time.
    #[must_use]
    pub fn daily_at(time: NaiveTime) -> Self {
        use chrono::Timelike;
        // hour() < 24 and minute() < 60, so the casts are lossless.
        Self::Daily {
            hour: time.hour() as u8,
            min: time.minute() as u8,
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interval { secs: 0 } => write!(f, "every tick"),
            Self::Interval { secs } => {
                if *secs >= 3600 {
                    write!(f, "every {} hours", secs / 3600)
                } else {
                    write!(f, "every {} minutes", secs / 60)
                }
            }
            Self::Daily { hour, min } => write!(f, "daily at {hour:02}:{min:02}"),
        }
    }
}

/// Outcome of executing a scheduled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Job completed with a summary message.
    Success(String),
    /// Job had nothing to do.
    Skipped(String),
    /// Job failed with an error message.
    Error(String),
}

impl JobOutcome {
    #[must_use]
    pub fn summary(&self) -> &str {
        match self {
            Self::Success(msg) | Self::Skipped(msg) | Self::Error(msg) => msg,
        }
    }
}

/// A job that runs on a schedule.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    /// Unique job identifier (e.g. [`JOB_REFRESH_CACHE`]).
    pub id: String,
    /// Human-readable job name.
    pub name: String,
    /// When to run this job.
    pub schedule: Schedule,
    /// Local time of the last run, if any.
    pub last_run: Option<DateTime<FixedOffset>>,
    /// Whether the job is enabled.
    pub enabled: bool,
}

impl ScheduledJob {
    /// Create a new enabled job with the given schedule.
    pub fn new(id: impl Into<String>, name: impl Into<String>, schedule: Schedule) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            schedule,
            last_run: None,
            enabled: true,
        }
    }

    /// Treat the job as having run at `at`, so a daily job does not fire
    /// for a slot that already passed before startup.
    #[must_use]
    pub fn last_run_at(mut self, at: DateTime<FixedOffset>) -> Self {
        self.last_run = Some(at);
        self
    }

    /// Returns `true` if the job is enabled and due at `now`.
    pub fn is_due_at(&self, now: DateTime<FixedOffset>) -> bool {
        if !self.enabled {
            return false;
        }

        match &self.schedule {
            Schedule::Interval { secs } => match self.last_run {
                None => true,
                Some(last) => {
                    let elapsed = (now - last).num_seconds();
                    elapsed < 0 || elapsed.unsigned_abs() >= *secs
                }
            },
            Schedule::Daily { hour, min } => {
                let Some(slot) = NaiveTime::from_hms_opt(u32::from(*hour), u32::from(*min), 0)
                else {
                    return false;
                };
                let scheduled = now.date_naive().and_time(slot);
                let now_local = now.naive_local();

                match self.last_run {
                    None => now_local >= scheduled,
                    Some(last) => last.naive_local() < scheduled && now_local >= scheduled,
                }
            }
        }
    }

    /// Record that the job ran at `now`.
    pub fn mark_run(&mut self, now: DateTime<FixedOffset>) {
        self.last_run = Some(now);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 10, h, m, 0)
            .unwrap()
    }

    #[test]
    fn interval_job_due_when_never_run() {
        let job = ScheduledJob::new("t", "T", Schedule::Interval { secs: 900 });
        assert!(job.is_due_at(at(9, 0)));
    }

    #[test]
    fn interval_job_waits_for_interval() {
        let mut job = ScheduledJob::new("t", "T", Schedule::Interval { secs: 900 });
        job.mark_run(at(9, 0));
        assert!(!job.is_due_at(at(9, 14)));
        assert!(job.is_due_at(at(9, 15)));
    }

    #[test]
    fn zero_interval_runs_every_tick() {
        let mut job = ScheduledJob::new("t", "T", Schedule::Interval { secs: 0 });
        job.mark_run(at(9, 0));
        assert!(job.is_due_at(at(9, 0)));
    }

    #[test]
    fn disabled_job_never_due() {
        let mut job = ScheduledJob::new("t", "T", Schedule::Interval { secs: 0 });
        job.enabled = false;
        assert!(!job.is_due_at(at(9, 0)));
    }

    #[test]
    fn daily_job_fires_once_per_day() {
        let job = ScheduledJob::new("d", "D", Schedule::Daily { hour: 8, min: 30 })
            .last_run_at(at(7, 0));
        assert!(!job.is_due_at(at(8, 29)));
        assert!(job.is_due_at(at(8, 30)));

        let mut job = job;
        job.mark_run(at(8, 30));
        assert!(!job.is_due_at(at(23, 59)));
        assert!(job.is_due_at(at(8, 30) + Duration::days(1)));
    }

    #[test]
    fn daily_job_seeded_after_slot_waits_for_tomorrow() {
        let job = ScheduledJob::new("d", "D", Schedule::Daily { hour: 8, min: 0 })
            .last_run_at(at(12, 0));
        assert!(!job.is_due_at(at(12, 1)));
        assert!(job.is_due_at(at(8, 0) + Duration::days(1)));
    }

    #[test]
    fn schedule_display() {
        assert_eq!(Schedule::Interval { secs: 900 }.to_string(), "every 15 minutes");
        assert_eq!(Schedule::Interval { secs: 0 }.to_string(), "every tick");
        assert_eq!(
            Schedule::daily_at(NaiveTime::from_hms_opt(8, 5, 0).unwrap()).to_string(),
            "daily at 08:05"
        );
    }
}
