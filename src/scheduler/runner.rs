//! Scheduler background loop.
//!
//! Ticks on a fixed interval and runs whichever jobs are due: cache
//! refresh, pre-shift notifications and the manager digest.

use crate::bot::format;
use crate::cache::TaskCache;
use crate::channels::traits::OutboundMessage;
use crate::channels::{Notifier, NotifyOutcome};
use crate::config::ScheduleConfig;
use crate::members::MembersRegistry;
use crate::model::Shift;
use crate::policy;
use crate::scheduler::tasks::{
    JOB_DAILY_DIGEST, JOB_NOTIFY_SHIFTS, JOB_REFRESH_CACHE, JobOutcome, Schedule, ScheduledJob,
};
use crate::store::RemoteStore;
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Background scheduler driving the task cache and proactive messages.
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    cache: TaskCache,
    store: Arc<dyn RemoteStore>,
    members: Arc<MembersRegistry>,
    notifier: Arc<Notifier>,
    manager_chat_id: Option<i64>,
    notification_offset: chrono::Duration,
    tick_interval: Duration,
    /// Handles already notified on `notified_on`.
    notified: HashSet<String>,
    notified_on: Option<NaiveDate>,
}

impl Scheduler {
    pub fn new(
        cache: TaskCache,
        store: Arc<dyn RemoteStore>,
        members: Arc<MembersRegistry>,
        notifier: Arc<Notifier>,
        config: &ScheduleConfig,
    ) -> Self {
        let notification_offset = chrono::Duration::try_minutes(config.notification_offset_minutes)
            .unwrap_or_else(|| {
                warn!(
                    minutes = config.notification_offset_minutes,
                    "notification offset out of range, notifying at shift start"
                );
                chrono::Duration::zero()
            });
        Self {
            jobs: Vec::new(),
            cache,
            store,
            members,
            notifier,
            manager_chat_id: None,
            notification_offset,
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
            notified: HashSet::new(),
            notified_on: None,
        }
    }

    /// Chat that receives digests and sync-failure reports.
    #[must_use]
    pub fn with_manager_chat(mut self, chat_id: Option<i64>) -> Self {
        self.manager_chat_id = chat_id;
        self
    }

    /// Register the standard jobs from configuration.
    #[must_use]
    pub fn with_default_jobs(mut self, config: &ScheduleConfig) -> Self {
        self.add_job(ScheduledJob::new(
            JOB_REFRESH_CACHE,
            "Refresh task cache from the sheet",
            Schedule::Interval {
                secs: config.refresh_interval_secs,
            },
        ));
        self.add_job(ScheduledJob::new(
            JOB_NOTIFY_SHIFTS,
            "Notify employees before their shift",
            Schedule::Interval { secs: 0 },
        ));
        if let Some(time) = config.daily_digest_time() {
            let now = self.cache.now();
            self.add_job(
                ScheduledJob::new(JOB_DAILY_DIGEST, "Manager daily digest", Schedule::daily_at(time))
                    .last_run_at(now),
            );
        } else if config.daily_digest_at.is_some() {
            warn!(value = ?config.daily_digest_at, "invalid daily digest time, digest disabled");
        }
        self
    }

    /// Add a job unless one with the same id exists.
    pub fn add_job(&mut self, job: ScheduledJob) {
        if self.jobs.iter().any(|j| j.id == job.id) {
            return;
        }
        info!(job = %job.id, schedule = %job.schedule, "scheduled job registered");
        self.jobs.push(job);
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    /// Start the scheduler loop. Stops when `cancel` fires.
    pub fn run(mut self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("scheduler started with {} jobs", self.jobs.len());
            let mut interval = tokio::time::interval(self.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                self.tick().await;
            }
            info!("scheduler stopped");
        })
    }

    /// Run every job due now, in registration order.
    pub async fn tick(&mut self) -> Vec<(String, JobOutcome)> {
        let now = self.cache.now();
        let due: Vec<String> = self
            .jobs
            .iter()
            .filter(|j| j.is_due_at(now))
            .map(|j| j.id.clone())
            .collect();

        let mut outcomes = Vec::with_capacity(due.len());
        for job_id in due {
            let outcome = self.execute(&job_id).await;
            match &outcome {
                JobOutcome::Success(msg) => debug!(job = %job_id, "{msg}"),
                JobOutcome::Skipped(msg) => debug!(job = %job_id, "skipped: {msg}"),
                JobOutcome::Error(msg) => error!(job = %job_id, "job failed: {msg}"),
            }
            if let Some(job) = self.jobs.iter_mut().find(|j| j.id == job_id) {
                job.mark_run(now);
            }
            outcomes.push((job_id, outcome));
        }
        outcomes
    }

    async fn execute(&mut self, job_id: &str) -> JobOutcome {
        match job_id {
            JOB_REFRESH_CACHE => self.refresh_cache().await,
            JOB_NOTIFY_SHIFTS => self.notify_shifts().await,
            JOB_DAILY_DIGEST => self.daily_digest().await,
            other => JobOutcome::Error(format!("unknown job: {other}")),
        }
    }

    async fn refresh_cache(&mut self) -> JobOutcome {
        self.report_unsynced().await;

        if !self.cache.refresh().await {
            return JobOutcome::Error("cache refresh failed, serving previous snapshot".to_owned());
        }

        match self.store.fetch_employees().await {
            Ok(employees) if employees.is_empty() && !self.members.all().is_empty() => {
                warn!("employee sheet returned no rows, keeping registered members");
            }
            Ok(employees) => {
                if let Err(err) = self.members.sync_with_table(&employees) {
                    warn!("members sync failed: {err}");
                }
            }
            Err(err) => warn!("cannot fetch employees: {err}"),
        }

        JobOutcome::Success(format!(
            "cache refreshed: {} tasks, {} shifts",
            self.cache.all_tasks().len(),
            self.cache.shifts_today().len()
        ))
    }

    /// Tell the manager about completions the next refresh will discard.
    async fn report_unsynced(&self) {
        let unsynced = self.cache.unsynced_completions();
        if unsynced.is_empty() {
            return;
        }
        let Some(chat_id) = self.manager_chat_id else {
            warn!(count = unsynced.len(), "unsynced completions and no manager chat to report to");
            return;
        };
        let text = format::unsynced_report(&unsynced, &self.cache.all_tasks());
        if let Err(err) = self.notifier.notify(OutboundMessage::text(chat_id, text)).await {
            warn!("cannot report unsynced completions: {err}");
        }
    }

    fn notification_due(&self, shift: &Shift, now: DateTime<FixedOffset>) -> bool {
        let Some(start) = shift.start_time else {
            return true;
        };
        // an offset reaching past the calendar range means "already due"
        shift
            .date
            .and_time(start)
            .checked_sub_signed(self.notification_offset)
            .is_none_or(|notify_at| now.naive_local() >= notify_at)
    }

    fn shift_over(shift: &Shift, now: DateTime<FixedOffset>) -> bool {
        match (shift.start_time, shift.end_time) {
            (Some(start), Some(end)) if end > start => now.time() > end,
            _ => false,
        }
    }

    async fn notify_shifts(&mut self) -> JobOutcome {
        let now = self.cache.now();
        let today = now.date_naive();
        if self.notified_on != Some(today) {
            self.notified.clear();
            self.notified_on = Some(today);
        }

        let mut sent = 0usize;
        for shift in self.cache.shifts_today() {
            let handle = shift.user_handle.clone();
            if self.notified.contains(&handle) || !self.notification_due(&shift, now) {
                continue;
            }
            if Self::shift_over(&shift, now) {
                self.notified.insert(handle);
                continue;
            }
            let Some(chat_id) = self.members.get_user_id(&handle) else {
                debug!(handle = %handle, "no chat id yet, employee has not sent /start");
                continue;
            };
            let tasks = self.cache.get_tasks_for_user(&handle, today);
            if tasks.is_empty() {
                self.notified.insert(handle);
                continue;
            }

            let (text, keyboard) = format::notification_message(&tasks, &shift, today);
            let message = OutboundMessage::text(chat_id, text).with_keyboard(keyboard);
            match self.notifier.notify(message).await {
                Ok(NotifyOutcome::Sent) => {
                    info!(handle = %handle, tasks = tasks.len(), "shift notification sent");
                    self.notified.insert(handle);
                    sent += 1;
                }
                Ok(NotifyOutcome::Throttled { .. }) => {}
                Err(err) => {
                    warn!(handle = %handle, "shift notification failed: {err}");
                    self.notified.insert(handle);
                }
            }
        }

        if sent == 0 {
            JobOutcome::Skipped("no notifications due".to_owned())
        } else {
            JobOutcome::Success(format!("sent {sent} shift notifications"))
        }
    }

    async fn daily_digest(&mut self) -> JobOutcome {
        let Some(chat_id) = self.manager_chat_id else {
            return JobOutcome::Skipped("no manager chat configured".to_owned());
        };
        let today = self.cache.today();
        let tasks: Vec<_> = self
            .cache
            .all_tasks()
            .into_iter()
            .filter(|t| policy::is_due(t, today))
            .collect();
        let shifts = self.cache.shifts_today();
        let text = format::digest_message(today, &tasks, &shifts);
        match self.notifier.notify(OutboundMessage::text(chat_id, text)).await {
            Ok(NotifyOutcome::Sent) => JobOutcome::Success("digest sent".to_owned()),
            Ok(NotifyOutcome::Throttled { retry_after_secs }) => {
                JobOutcome::Error(format!("digest rate limited, retry after {retry_after_secs}s"))
            }
            Err(err) => JobOutcome::Error(format!("digest failed: {err}")),
        }
    }
}
