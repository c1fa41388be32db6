//! Day-scoped task cache with an optimistic completion overlay.
//!
//! The cache owns one snapshot of today's tasks and shifts pulled from a
//! [`RemoteStore`]. Completions made through the bot land in an in-memory
//! overlay first and are pushed to the store in the background. A refresh
//! replaces the snapshot wholesale and discards the overlay; a date change
//! wipes everything until the next refresh.

use crate::clock::Clock;
use crate::model::{Completion, Shift, Task, TaskId, TaskStatus, normalize_handle};
use crate::policy;
use crate::store::RemoteStore;
use chrono::{DateTime, Days, FixedOffset, NaiveDate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Freshness of the snapshot relative to the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing loaded since start or since the last invalidation.
    Empty,
    /// Loaded for today.
    Fresh,
    /// Loaded for an earlier date.
    Stale,
}

#[derive(Debug, Default)]
struct Snapshot {
    date: Option<NaiveDate>,
    tasks: Vec<Task>,
    shifts: Vec<Shift>,
    /// handle -> task id -> completion time
    overlay: HashMap<String, HashMap<TaskId, DateTime<FixedOffset>>>,
    last_refresh: Option<DateTime<FixedOffset>>,
    populated: bool,
    unsynced: Vec<Completion>,
}

impl Snapshot {
    fn wipe(&mut self, today: NaiveDate) {
        self.date = Some(today);
        self.tasks.clear();
        self.shifts.clear();
        self.overlay.clear();
        self.populated = false;
    }
}

struct CacheInner {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    snapshot: Mutex<Snapshot>,
    refresh_lock: tokio::sync::Mutex<()>,
    syncs: TaskTracker,
}

/// Cheaply clonable handle to the shared task cache.
#[derive(Clone)]
pub struct TaskCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for TaskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCache")
            .field("store", &self.inner.store.id())
            .field("state", &self.state())
            .finish()
    }
}

impl TaskCache {
    /// Create an empty cache. Nothing is fetched until [`refresh`](Self::refresh).
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                clock,
                snapshot: Mutex::new(Snapshot::default()),
                refresh_lock: tokio::sync::Mutex::new(()),
                syncs: TaskTracker::new(),
            }),
        }
    }

    fn snapshot(&self) -> MutexGuard<'_, Snapshot> {
        self.inner
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current local time according to the injected clock.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.inner.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.inner.clock.today()
    }

    /// Pull tasks and today's shifts from the store and replace the snapshot.
    ///
    /// Refreshes are serialized. On failure the previous snapshot is kept and
    /// `false` is returned; the error is only logged.
    pub async fn refresh(&self) -> bool {
        let _guard = self.inner.refresh_lock.lock().await;

        let now = self.inner.clock.now();
        let today = now.date_naive();
        info!(store = self.inner.store.id(), %today, "refreshing task cache");

        let fetched = tokio::try_join!(
            self.inner.store.fetch_tasks(),
            self.inner.store.fetch_shifts(today)
        );
        let (tasks, shifts) = match fetched {
            Ok(data) => data,
            Err(err) => {
                error!(error = %err, "cache refresh failed, keeping previous snapshot");
                return false;
            }
        };

        let mut snap = self.snapshot();
        if !snap.unsynced.is_empty() {
            let ids: Vec<TaskId> = snap.unsynced.iter().map(|c| c.task_id).collect();
            warn!(
                ?ids,
                "discarding completions that never reached the store"
            );
        }
        info!(tasks = tasks.len(), shifts = shifts.len(), "cache refreshed");
        *snap = Snapshot {
            date: Some(today),
            tasks,
            shifts,
            overlay: HashMap::new(),
            last_refresh: Some(now),
            populated: true,
            unsynced: Vec::new(),
        };
        true
    }

    /// Wipe the snapshot if the calendar date moved past it.
    ///
    /// Returns `true` when a wipe happened. Does not fetch anything.
    pub fn invalidate_if_date_changed(&self) -> bool {
        let today = self.inner.clock.today();
        let mut snap = self.snapshot();
        Self::invalidate_locked(&mut snap, today)
    }

    fn invalidate_locked(snap: &mut Snapshot, today: NaiveDate) -> bool {
        if snap.date == Some(today) {
            return false;
        }
        info!(from = ?snap.date, to = %today, "date changed, invalidating cache");
        snap.wipe(today);
        true
    }

    /// Tasks due on `reference` with the user's local completions overlaid.
    pub fn get_tasks_for_user(&self, user: &str, reference: NaiveDate) -> Vec<Task> {
        let today = self.inner.clock.today();
        let mut snap = self.snapshot();
        Self::invalidate_locked(&mut snap, today);

        let done = snap.overlay.get(&normalize_handle(user));
        snap.tasks
            .iter()
            .filter(|task| policy::is_due(task, reference))
            .map(|task| {
                let mut task = task.clone();
                if let Some(at) = done.and_then(|done| done.get(&task.id)) {
                    task.status = TaskStatus::Done;
                    task.completed_at = Some(*at);
                }
                task
            })
            .collect()
    }

    /// Today's shift for `user`, matched case-insensitively by handle.
    pub fn get_shift_for_user(&self, user: &str) -> Option<Shift> {
        let today = self.inner.clock.today();
        let mut snap = self.snapshot();
        Self::invalidate_locked(&mut snap, today);

        let handle = normalize_handle(user);
        snap.shifts
            .iter()
            .find(|shift| shift.user_handle == handle)
            .cloned()
    }

    /// Record a completion in the overlay. Never fails.
    pub fn mark_completed_local(&self, task_id: TaskId, user: &str, at: DateTime<FixedOffset>) {
        let handle = normalize_handle(user);
        self.snapshot()
            .overlay
            .entry(handle.clone())
            .or_default()
            .insert(task_id, at);
        info!(task_id, user = %handle, "task marked completed locally");
    }

    /// Push a completion to the store. Best effort: the overlay is untouched
    /// and a failure is logged and remembered in the unsynced list.
    pub async fn sync_to_sheets(&self, completion: Completion) -> bool {
        let ok = match self.inner.store.persist_completion(&completion).await {
            Ok(true) => {
                info!(task_id = completion.task_id, "completion synced to store");
                true
            }
            Ok(false) => {
                error!(task_id = completion.task_id, "store rejected completion");
                false
            }
            Err(err) => {
                error!(task_id = completion.task_id, error = %err, "completion sync failed");
                false
            }
        };
        if !ok {
            self.snapshot().unsynced.push(completion);
        }
        ok
    }

    /// Fire-and-forget [`sync_to_sheets`](Self::sync_to_sheets) on the
    /// cache's task tracker.
    pub fn spawn_sync(&self, completion: Completion) -> JoinHandle<bool> {
        let cache = self.clone();
        debug!(task_id = completion.task_id, "spawning background sync");
        self.inner
            .syncs
            .spawn(async move { cache.sync_to_sheets(completion).await })
    }

    /// Stop accepting background syncs and wait for in-flight ones.
    pub async fn shutdown(&self) {
        self.inner.syncs.close();
        let pending = self.inner.syncs.len();
        if pending > 0 {
            info!(pending, "waiting for background syncs");
        }
        self.inner.syncs.wait().await;
    }

    pub fn state(&self) -> CacheState {
        let today = self.inner.clock.today();
        let snap = self.snapshot();
        match snap.date {
            Some(date) if date != today => CacheState::Stale,
            Some(_) if snap.populated => CacheState::Fresh,
            _ => CacheState::Empty,
        }
    }

    pub fn snapshot_date(&self) -> Option<NaiveDate> {
        self.snapshot().date
    }

    pub fn last_refresh(&self) -> Option<DateTime<FixedOffset>> {
        self.snapshot().last_refresh
    }

    /// All of today's shifts (after the invalidation guard).
    pub fn shifts_today(&self) -> Vec<Shift> {
        let today = self.inner.clock.today();
        let mut snap = self.snapshot();
        Self::invalidate_locked(&mut snap, today);
        snap.shifts.clone()
    }

    /// Every task in the snapshot, due or not.
    pub fn all_tasks(&self) -> Vec<Task> {
        let today = self.inner.clock.today();
        let mut snap = self.snapshot();
        Self::invalidate_locked(&mut snap, today);
        snap.tasks.clone()
    }

    /// Completions whose background sync failed since the last refresh.
    pub fn unsynced_completions(&self) -> Vec<Completion> {
        self.snapshot().unsynced.clone()
    }

    /// Tasks last completed by `who` within the past `days` days, newest first.
    ///
    /// `who` matches either the handle (substring) or the exact display name
    /// written into the completed-by column.
    pub fn recent_completions(&self, who: &[&str], days: u64) -> Vec<Task> {
        let today = self.inner.clock.today();
        let since = today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
        let needles: Vec<String> = who
            .iter()
            .map(|w| normalize_handle(w))
            .filter(|w| !w.is_empty())
            .collect();

        let mut snap = self.snapshot();
        Self::invalidate_locked(&mut snap, today);
        let mut history: Vec<Task> = snap
            .tasks
            .iter()
            .filter(|task| {
                task.last_completed_date
                    .date()
                    .is_some_and(|d| d >= since && d <= today)
            })
            .filter(|task| {
                task.completed_by.as_deref().is_some_and(|by| {
                    let by = by.to_lowercase();
                    needles.iter().any(|needle| by.contains(needle.as_str()))
                })
            })
            .cloned()
            .collect();
        history.sort_by(|a, b| b.last_completed_date.date().cmp(&a.last_completed_date.date()));
        history
    }
}
