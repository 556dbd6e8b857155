//! Timing authority for the recurring poll tasks

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{runtime::Handle, task::JoinHandle, time::sleep};
use tracing::{debug, info, instrument, warn};

use super::{
    config::PollingConfig,
    error::{ClientError, Result},
    service::{Followup, RequestCoordinator},
    task::{ManualRequest, PollTask, SharedTasks, TaskHandle, TaskTable, lock},
};
use crate::{
    connectivity::ConnectivityListener,
    dispatcher::{Dispatcher, EventBus},
    event::HubbyEvent,
    id::TaskId,
};

/// Owns the timer of every poll task and decides when a tick fires
///
/// Cloning yields another handle to the same scheduler.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tasks: SharedTasks,
    coordinator: Arc<RequestCoordinator>,
    events: EventBus,
    handle: Handle,
    state: Mutex<SchedulerState>,
}

#[derive(Debug)]
struct SchedulerState {
    timers: HashMap<TaskId, Timer>,
    /// Tasks to re-arm once connectivity returns; `Some` while paused
    paused: Option<BTreeSet<TaskId>>,
    /// Started and not stopped since; survives revocation and pauses
    wanted: BTreeSet<TaskId>,
    authorized: bool,
}

/// An armed task timer, cancelled on drop
#[derive(Debug)]
struct Timer {
    interval: Duration,
    handle: JoinHandle<()>,
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl PollScheduler {
    /// Create the scheduler and its task table.
    ///
    /// Must be called within a Tokio runtime; timers and requests are spawned
    /// on it.
    pub fn new(
        coordinator: Arc<RequestCoordinator>,
        events: EventBus,
        polling: &PollingConfig,
        authorized: bool,
    ) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| {
            ClientError::config("PollScheduler must be created within a Tokio runtime context")
        })?;

        let inner = Inner {
            tasks: TaskTable::new(polling, authorized).shared(),
            coordinator,
            events,
            handle,
            state: Mutex::new(SchedulerState {
                timers: HashMap::new(),
                paused: None,
                wanted: BTreeSet::new(),
                authorized,
            }),
        };

        Ok(Self { inner: Arc::new(inner) })
    }

    /// Arm the task's timer.
    ///
    /// No-op when the task is disabled or already running at `interval`; a
    /// running task with another interval is restarted and keeps its last
    /// result and error.
    #[instrument(skip(self), fields(task = %task))]
    pub fn start(&self, task: TaskId, interval: Duration) -> Result<()> {
        validate_interval(task, interval)?;
        let mut state = self.inner.state();
        state.wanted.insert(task);

        {
            let mut tasks = lock(&self.inner.tasks);
            match tasks.get_mut(task) {
                Some(t) if t.enabled => t.interval = interval,
                _ => {
                    debug!("Task disabled, not starting");
                    return Ok(());
                },
            }
        }

        if let Some(paused) = state.paused.as_mut() {
            debug!("Connectivity paused, task will start on resume");
            paused.insert(task);
            return Ok(());
        }

        let first_tick = match state.timers.get(&task) {
            Some(timer) if timer.interval == interval => return Ok(()),
            Some(_) => interval,
            None => Duration::ZERO,
        };

        info!(interval = ?interval, "Starting poll task");
        self.inner.arm(&mut state, task, interval, first_tick);
        Ok(())
    }

    /// Cancel the task's timer; an outstanding request still completes
    #[instrument(skip(self), fields(task = %task))]
    pub fn stop(&self, task: TaskId) {
        let mut state = self.inner.state();
        state.wanted.remove(&task);
        if state.timers.remove(&task).is_some() {
            info!("Stopped poll task");
        }
        if let Some(paused) = state.paused.as_mut() {
            paused.remove(&task);
        }
    }

    /// Change the interval with [`start`](Self::start) semantics.
    ///
    /// Zero fails with a config error and leaves everything as it was.
    pub fn set_interval(&self, task: TaskId, interval: Duration) -> Result<()> {
        self.start(task, interval)
    }

    /// Cancel all timers; outstanding requests still complete
    pub fn pause_all(&self) {
        let mut state = self.inner.state();
        if state.paused.is_some() {
            return;
        }

        let active: BTreeSet<TaskId> = state.timers.keys().copied().collect();
        state.timers.clear();
        info!(tasks = active.len(), "Paused polling");
        state.paused = Some(active);
    }

    /// Re-arm every task that was active before the pause, ticking immediately
    pub fn resume_all(&self) {
        let mut state = self.inner.state();
        let Some(paused) = state.paused.take() else {
            return;
        };

        let intervals: Vec<(TaskId, Duration)> = {
            let tasks = lock(&self.inner.tasks);
            paused
                .into_iter()
                .filter_map(|id| tasks.get(id))
                .filter(|t| t.enabled)
                .map(|t| (t.id, t.interval))
                .collect()
        };

        info!(tasks = intervals.len(), "Resuming polling");
        for (task, interval) in intervals {
            state.wanted.insert(task);
            self.inner.arm(&mut state, task, interval, Duration::ZERO);
        }
    }

    /// User-triggered refresh.
    ///
    /// Runs now when the task is idle, otherwise queues a single refresh
    /// behind the outstanding request.
    #[instrument(skip(self), fields(task = %task))]
    pub fn refresh_now(&self, task: TaskId) -> Result<()> {
        let request = lock(&self.inner.tasks).request_manual(task);
        match request {
            ManualRequest::Dispatch => {
                debug!("Manual refresh dispatched");
                self.inner.spawn_dispatch(task);
                Ok(())
            },
            ManualRequest::Queued => {
                debug!("Manual refresh queued behind outstanding request");
                Ok(())
            },
            ManualRequest::Disabled => Err(ClientError::MissingCredential),
        }
    }

    /// Disable every authorization-dependent task and stop its timer
    pub fn revoke_authorization(&self) {
        self.inner.revoke_authorization();
    }

    /// Re-enable authorization-dependent tasks after a new credential arrived.
    ///
    /// Only tasks that were started and not stopped get their timers back.
    pub fn reauthorize(&self) {
        let mut state = self.inner.state();
        if state.authorized {
            return;
        }
        state.authorized = true;

        let enabled = lock(&self.inner.tasks).enable_authorized();
        for (task, interval) in enabled {
            if !state.wanted.contains(&task) {
                debug!(task = %task, "Re-enabled but stopped, not arming");
                continue;
            }
            match state.paused.as_mut() {
                Some(paused) => {
                    paused.insert(task);
                },
                None => self.inner.arm(&mut state, task, interval, Duration::ZERO),
            }
        }
        drop(state);

        info!("Authorization restored");
        self.inner.events.dispatch(HubbyEvent::Reauthorized);
    }

    /// Snapshot of a task's state
    pub fn task(&self, task: TaskId) -> Option<PollTask> {
        lock(&self.inner.tasks).get(task).cloned()
    }

    pub fn is_running(&self, task: TaskId) -> bool {
        self.inner.state().timers.contains_key(&task)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state().paused.is_some()
    }

    pub fn is_authorized(&self) -> bool {
        self.inner.state().authorized
    }

    /// Cancel every timer at session teardown
    pub fn shutdown(&self) {
        let mut state = self.inner.state();
        debug!(timers = state.timers.len(), "Shutting down poll scheduler");
        state.timers.clear();
        state.paused = None;
        state.wanted.clear();
    }
}

impl ConnectivityListener for PollScheduler {
    fn connectivity_lost(&self) {
        self.pause_all();
    }

    fn connectivity_restored(&self) {
        self.resume_all();
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the task's timer; the old one is cancelled when dropped
    fn arm(
        self: &Arc<Self>,
        state: &mut SchedulerState,
        task: TaskId,
        interval: Duration,
        first_tick: Duration,
    ) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let handle = self.handle.spawn(async move {
            let mut delay = first_tick;
            loop {
                sleep(delay).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.tick(task);
                delay = interval;
            }
        });

        state.timers.insert(task, Timer { interval, handle });
    }

    fn tick(self: &Arc<Self>, task: TaskId) {
        if !lock(&self.tasks).try_begin(task) {
            debug!(task = %task, "Tick dropped");
            return;
        }
        self.spawn_dispatch(task);
    }

    /// Run the request off the timer, then apply the coordinator's followup
    fn spawn_dispatch(self: &Arc<Self>, task: TaskId) {
        let inner = Arc::clone(self);
        self.handle.spawn(async move {
            loop {
                let handle = TaskHandle::new(inner.tasks.clone(), task);
                let report = inner.coordinator.dispatch(handle).await;

                match report.followup {
                    Followup::Settled => {},
                    Followup::Backoff(reset_at) => inner.back_off(task, reset_at),
                    Followup::Revoked => inner.revoke_authorization(),
                }

                if !report.rerun {
                    break;
                }
            }
        });
    }

    /// Single-step backoff: push the next tick out, then resume the interval
    fn back_off(self: &Arc<Self>, task: TaskId, reset_at: Option<DateTime<Utc>>) {
        let mut state = self.state();
        let Some(interval) = state.timers.get(&task).map(|t| t.interval) else {
            return;
        };

        let delay = backoff_delay(interval, reset_at, Utc::now());
        warn!(task = %task, delay = ?delay, "Rate limited, delaying next poll");
        self.arm(&mut state, task, interval, delay);
    }

    fn revoke_authorization(&self) {
        let mut state = self.state();
        let disabled = lock(&self.tasks).disable_authorized();

        for task in TaskId::ALL.into_iter().filter(TaskId::requires_authorization) {
            state.timers.remove(&task);
            if let Some(paused) = state.paused.as_mut() {
                paused.remove(&task);
            }
        }

        if !state.authorized {
            return;
        }
        state.authorized = false;
        drop(state);

        warn!(disabled = ?disabled, "Authorization revoked, authenticated polling disabled");
        self.events.dispatch(HubbyEvent::AuthorizationRevoked);
    }
}

fn validate_interval(task: TaskId, interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(ClientError::config_validation(
            format!("{task} interval"),
            "Polling interval must be greater than zero",
        ));
    }
    Ok(())
}

/// Delay until the reset instant (never shorter than the interval), or
/// twice the interval when the server gave no reset
fn backoff_delay(interval: Duration, reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    match reset_at {
        Some(reset_at) => (reset_at - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(interval),
        None => interval.saturating_mul(2),
    }
}
