//! Per-task polling state

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use compact_str::CompactString;

use super::{
    config::PollingConfig,
    error::{ClientError, ErrorKind},
};
use crate::{domain::TaskPayload, id::TaskId};

pub type SharedTasks = Arc<Mutex<TaskTable>>;

#[derive(Debug, Clone, PartialEq)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: CompactString,
}

/// A named, independently scheduled recurring request
#[derive(Debug, Clone)]
pub struct PollTask {
    pub id: TaskId,
    pub interval: Duration,
    /// Set from dispatch until the result or error has been applied
    pub in_flight: bool,
    pub last_result: Option<TaskPayload>,
    pub last_error: Option<TaskError>,
    pub enabled: bool,
    /// One user refresh waiting behind the outstanding request
    pub pending_manual: bool,
}

/// What a user-triggered refresh turned into
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ManualRequest {
    /// Nothing outstanding; the caller dispatches now
    Dispatch,
    /// Runs as soon as the outstanding request completes
    Queued,
    Disabled,
}

/// The singleton task per [`TaskId`]
#[derive(Debug)]
pub struct TaskTable {
    tasks: BTreeMap<TaskId, PollTask>,
}

impl PollTask {
    pub fn new(id: TaskId, interval: Duration, enabled: bool) -> Self {
        Self {
            id,
            interval,
            in_flight: false,
            last_result: None,
            last_error: None,
            enabled,
            pending_manual: false,
        }
    }
}

impl TaskTable {
    pub fn new(polling: &PollingConfig, authorized: bool) -> Self {
        let tasks = TaskId::ALL
            .into_iter()
            .map(|id| {
                let enabled = authorized || !id.requires_authorization();
                (id, PollTask::new(id, polling.interval(id), enabled))
            })
            .collect();
        Self { tasks }
    }

    pub fn shared(self) -> SharedTasks {
        Arc::new(Mutex::new(self))
    }

    pub fn get(&self, id: TaskId) -> Option<&PollTask> {
        self.tasks.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut PollTask> {
        self.tasks.get_mut(&id)
    }

    /// Claim the task for a scheduled dispatch.
    ///
    /// Returns false, and changes nothing, when the task is disabled or a
    /// request is already outstanding.
    pub fn try_begin(&mut self, id: TaskId) -> bool {
        match self.tasks.get_mut(&id) {
            Some(task) if task.enabled && !task.in_flight => {
                task.in_flight = true;
                true
            },
            _ => false,
        }
    }

    pub fn request_manual(&mut self, id: TaskId) -> ManualRequest {
        match self.tasks.get_mut(&id) {
            Some(task) if !task.enabled => ManualRequest::Disabled,
            Some(task) if task.in_flight => {
                task.pending_manual = true;
                ManualRequest::Queued
            },
            Some(task) => {
                task.in_flight = true;
                ManualRequest::Dispatch
            },
            None => ManualRequest::Disabled,
        }
    }

    /// Apply a finished request.
    ///
    /// Returns true when a queued manual refresh takes over the in-flight
    /// slot and must be dispatched right away.
    pub fn complete(&mut self, id: TaskId, result: &Result<TaskPayload, ClientError>) -> bool {
        if let Err(e) = result
            && e.kind() == ErrorKind::Authorization
        {
            self.disable_authorized();
        }

        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };

        match result {
            Ok(payload) => {
                task.last_result = Some(payload.clone());
                task.last_error = None;
            },
            Err(e) => {
                task.last_error = Some(TaskError { kind: e.kind(), message: e.to_string().into() });
            },
        }

        if task.pending_manual && task.enabled {
            task.pending_manual = false;
            true
        } else {
            task.pending_manual = false;
            task.in_flight = false;
            false
        }
    }

    /// Disable every task that needs a credential, returning the ones that changed
    pub fn disable_authorized(&mut self) -> Vec<TaskId> {
        self.tasks
            .values_mut()
            .filter(|t| t.id.requires_authorization() && t.enabled)
            .map(|t| {
                t.enabled = false;
                t.pending_manual = false;
                t.id
            })
            .collect()
    }

    /// Re-enable authorization-dependent tasks, returning them with their intervals
    pub fn enable_authorized(&mut self) -> Vec<(TaskId, Duration)> {
        self.tasks
            .values_mut()
            .filter(|t| t.id.requires_authorization())
            .map(|t| {
                t.enabled = true;
                (t.id, t.interval)
            })
            .collect()
    }
}

pub(crate) fn lock(tasks: &Mutex<TaskTable>) -> MutexGuard<'_, TaskTable> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mutable access to one task for the span of a single dispatch
///
/// Consumed by [`TaskHandle::complete`], so it cannot outlive the request.
#[derive(Debug)]
pub struct TaskHandle {
    tasks: SharedTasks,
    id: TaskId,
}

impl TaskHandle {
    pub fn new(tasks: SharedTasks, id: TaskId) -> Self {
        Self { tasks, id }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn complete(self, result: &Result<TaskPayload, ClientError>) -> bool {
        lock(&self.tasks).complete(self.id, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ServiceStatus, StatusIndicator};

    fn status_payload() -> TaskPayload {
        TaskPayload::Status(ServiceStatus {
            indicator: StatusIndicator::None,
            description: "All Systems Operational".into(),
            updated_at: None,
        })
    }

    #[test]
    fn authenticated_tasks_start_disabled_without_credential() {
        let table = TaskTable::new(&PollingConfig::default(), false);
        assert!(table.get(TaskId::Status).unwrap().enabled);
        assert!(!table.get(TaskId::RepoList).unwrap().enabled);
    }

    #[test]
    fn second_begin_is_refused_while_in_flight() {
        let mut table = TaskTable::new(&PollingConfig::default(), true);
        assert!(table.try_begin(TaskId::Status));
        assert!(!table.try_begin(TaskId::Status));
        assert!(table.try_begin(TaskId::RepoList));

        assert!(!table.complete(TaskId::Status, &Ok(status_payload())));
        assert!(table.try_begin(TaskId::Status));
    }

    #[test]
    fn success_clears_previous_error() {
        let mut table = TaskTable::new(&PollingConfig::default(), true);
        table.try_begin(TaskId::Status);
        table.complete(TaskId::Status, &Err(ClientError::Timeout));
        assert_eq!(table.get(TaskId::Status).unwrap().last_error.as_ref().unwrap().kind, ErrorKind::Network);

        table.try_begin(TaskId::Status);
        table.complete(TaskId::Status, &Ok(status_payload()));
        let task = table.get(TaskId::Status).unwrap();
        assert!(task.last_error.is_none());
        assert_eq!(task.last_result, Some(status_payload()));
        assert!(!task.in_flight);
    }

    #[test]
    fn failure_keeps_last_result() {
        let mut table = TaskTable::new(&PollingConfig::default(), true);
        table.try_begin(TaskId::Status);
        table.complete(TaskId::Status, &Ok(status_payload()));
        table.try_begin(TaskId::Status);
        table.complete(TaskId::Status, &Err(ClientError::Timeout));

        let task = table.get(TaskId::Status).unwrap();
        assert_eq!(task.last_result, Some(status_payload()));
        assert!(task.last_error.is_some());
    }

    #[test]
    fn manual_refresh_queues_once_and_keeps_slot() {
        let mut table = TaskTable::new(&PollingConfig::default(), true);
        assert_eq!(table.request_manual(TaskId::Status), ManualRequest::Dispatch);
        assert_eq!(table.request_manual(TaskId::Status), ManualRequest::Queued);
        assert_eq!(table.request_manual(TaskId::Status), ManualRequest::Queued);

        // the queued refresh inherits the in-flight slot, so ticks stay out
        assert!(table.complete(TaskId::Status, &Ok(status_payload())));
        assert!(table.get(TaskId::Status).unwrap().in_flight);
        assert!(!table.try_begin(TaskId::Status));

        assert!(!table.complete(TaskId::Status, &Ok(status_payload())));
        assert!(!table.get(TaskId::Status).unwrap().in_flight);
    }

    #[test]
    fn authorization_failure_disables_all_authenticated_tasks() {
        let mut table = TaskTable::new(&PollingConfig::default(), true);
        table.try_begin(TaskId::RepoList);
        table.request_manual(TaskId::RepoList);

        let rerun = table.complete(TaskId::RepoList, &Err(ClientError::InvalidToken));

        assert!(!rerun);
        let repo = table.get(TaskId::RepoList).unwrap();
        assert!(!repo.enabled);
        assert!(!repo.in_flight);
        assert!(!repo.pending_manual);
        assert!(table.get(TaskId::Status).unwrap().enabled);
        assert_eq!(table.request_manual(TaskId::RepoList), ManualRequest::Disabled);
        assert!(!table.try_begin(TaskId::RepoList));
    }

    #[test]
    fn enable_authorized_reports_intervals() {
        let mut table = TaskTable::new(&PollingConfig::default(), false);
        assert_eq!(
            table.enable_authorized(),
            vec![(TaskId::RepoList, Duration::from_secs(300))]
        );
        assert!(table.get(TaskId::RepoList).unwrap().enabled);
    }
}
