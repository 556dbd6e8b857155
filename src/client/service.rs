//! Request coordination between the scheduler, user actions and the API

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use super::{
    api::GithubClient,
    credentials::{Credential, CredentialProvider},
    error::{ClientError, ErrorKind, Result},
    task::TaskHandle,
};
use crate::{
    dispatcher::{Dispatcher, EventBus},
    domain::{Gist, NewGist, NewRepository, Repository, TaskPayload},
    event::{HubbyEvent, PollResult},
    id::{TaskId, WriteKind},
};

/// What the scheduler has to do after a request finished
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Followup {
    Settled,
    /// Extend the next tick, to the reset instant when the server sent one
    Backoff(Option<DateTime<Utc>>),
    /// Disable every authorization-dependent task
    Revoked,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchReport {
    pub followup: Followup,
    /// A queued manual refresh must run immediately
    pub rerun: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteReport<T> {
    pub result: PollResult<T>,
    pub followup: Followup,
}

/// Executes API calls for dispatched ticks and user actions
///
/// Every outcome is classified here and published to subscribers; nothing
/// escapes as an unhandled error.
pub struct RequestCoordinator {
    api: Arc<dyn GithubClient>,
    credentials: Arc<dyn CredentialProvider>,
    events: EventBus,
    writes: Mutex<HashSet<WriteKind>>,
}

/// Marks a write kind as outstanding until dropped
struct WriteGuard<'a> {
    writes: &'a Mutex<HashSet<WriteKind>>,
    kind: WriteKind,
}

impl<'a> WriteGuard<'a> {
    fn acquire(writes: &'a Mutex<HashSet<WriteKind>>, kind: WriteKind) -> Option<Self> {
        let inserted = writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
        inserted.then_some(Self { writes, kind })
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.kind);
    }
}

impl Followup {
    fn for_task_error(e: &ClientError) -> Self {
        match e.kind() {
            ErrorKind::Authorization => Followup::Revoked,
            ErrorKind::RateLimit => Followup::Backoff(e.rate_limit_reset()),
            _ => Followup::Settled,
        }
    }

    fn for_write_error(e: &ClientError) -> Self {
        // writes are never retried, so only revocation matters
        match e.kind() {
            ErrorKind::Authorization => Followup::Revoked,
            _ => Followup::Settled,
        }
    }
}

impl std::fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("events", &self.events)
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}

impl RequestCoordinator {
    pub fn new(
        api: Arc<dyn GithubClient>,
        credentials: Arc<dyn CredentialProvider>,
        events: EventBus,
    ) -> Self {
        Self { api, credentials, events, writes: Mutex::new(HashSet::new()) }
    }

    /// Run exactly one API call for the task behind `handle`.
    ///
    /// The handle is consumed when the outcome is applied; subscribers are
    /// notified afterwards.
    #[instrument(skip(self, handle), fields(task = %handle.id()))]
    pub async fn dispatch(&self, handle: TaskHandle) -> DispatchReport {
        let task = handle.id();
        let result = self.call(task).await;

        let followup = match &result {
            Ok(payload) => {
                debug!(items = payload_len(payload), "Poll succeeded");
                Followup::Settled
            },
            Err(e) => {
                match e.kind() {
                    ErrorKind::Network => warn!(error = %e, "Poll failed, keeping schedule"),
                    kind => error!(error = %e, kind = %kind, "Poll failed"),
                }
                Followup::for_task_error(e)
            },
        };

        let rerun = handle.complete(&result);
        self.events
            .dispatch(HubbyEvent::task_outcome(task, result.into()));

        DispatchReport { followup, rerun }
    }

    /// Create a repository unless another creation is outstanding
    #[instrument(skip(self), fields(name = %repository.name))]
    pub async fn create_repository(&self, repository: &NewRepository) -> WriteReport<Repository> {
        let report = self
            .write(WriteKind::CreateRepository, repository.validate(), |api, credential| {
                Box::pin(async move { api.create_repository(&credential, repository).await })
            })
            .await;

        if let PollResult::Success(created) = &report.result {
            info!(repository = %created.full_name, "Repository created");
        }
        self.events
            .dispatch(HubbyEvent::RepositoryCreated(report.result.clone()));
        report
    }

    /// Create a gist unless another gist creation is outstanding
    #[instrument(skip(self, gist), fields(files = gist.files.len()))]
    pub async fn create_gist(&self, gist: &NewGist) -> WriteReport<Gist> {
        let report = self
            .write(WriteKind::CreateGist, gist.validate(), |api, credential| {
                Box::pin(async move { api.create_gist(&credential, gist).await })
            })
            .await;

        if let PollResult::Success(created) = &report.result {
            info!(gist = %created.id, "Gist created");
        }
        self.events
            .dispatch(HubbyEvent::GistCreated(report.result.clone()));
        report
    }

    /// Whether a write of `kind` is outstanding
    pub fn is_writing(&self, kind: WriteKind) -> bool {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind)
    }

    async fn call(&self, task: TaskId) -> Result<TaskPayload> {
        match task {
            TaskId::Status => self
                .api
                .fetch_status()
                .await
                .map(TaskPayload::Status),
            TaskId::RepoList => {
                let credential = self.current_credential()?;
                self.api
                    .list_repositories(&credential)
                    .await
                    .map(TaskPayload::Repositories)
            },
        }
    }

    async fn write<'a, T, F>(
        &'a self,
        kind: WriteKind,
        validation: Result<()>,
        call: F,
    ) -> WriteReport<T>
    where
        F: FnOnce(
            &'a dyn GithubClient,
            Credential,
        ) -> std::pin::Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>,
    {
        if let Err(e) = validation {
            warn!(error = %e, "Rejected write parameters");
            return WriteReport { result: PollResult::from(&e), followup: Followup::Settled };
        }

        let Some(_guard) = WriteGuard::acquire(&self.writes, kind) else {
            let e = ClientError::busy(kind);
            warn!(error = %e, "Rejected duplicate write");
            return WriteReport { result: PollResult::from(&e), followup: Followup::Settled };
        };

        let outcome = match self.current_credential() {
            Ok(credential) => call(self.api.as_ref(), credential).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => WriteReport { result: PollResult::Success(value), followup: Followup::Settled },
            Err(e) => {
                error!(error = %e, kind = %e.kind(), "Write failed");
                WriteReport { result: PollResult::from(&e), followup: Followup::for_write_error(&e) }
            },
        }
    }

    /// Read per call; never cached across calls
    fn current_credential(&self) -> Result<Credential> {
        self.credentials
            .credential()
            .ok_or(ClientError::MissingCredential)
    }
}

fn payload_len(payload: &TaskPayload) -> usize {
    match payload {
        TaskPayload::Status(_) => 1,
        TaskPayload::Repositories(repos) => repos.len(),
    }
}
