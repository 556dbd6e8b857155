//! Session lifetime: wiring, inbound actions and teardown

use std::{sync::Arc, time::Duration};

use compact_str::CompactString;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    client::{
        ClientError, Credential, CredentialProvider, GithubClient, PollScheduler, PollTask, PollingConfig,
        RequestCoordinator, Result,
        service::{Followup, WriteReport},
    },
    connectivity::{ConnectivityMonitor, ConnectivityState},
    dispatcher::EventBus,
    domain::{Gist, NewGist, NewRepository, Repository, Visibility},
    event::{HubbyEvent, PollResult},
    id::TaskId,
};

const CONNECTIVITY_BUFFER: usize = 16;

/// One monitoring session, from start-up to teardown
///
/// Owns the scheduler, the coordinator and the background listeners for
/// credential and connectivity changes. Dropping the session cancels every
/// timer; requests already outstanding still finish.
#[derive(Debug)]
pub struct Session {
    scheduler: PollScheduler,
    coordinator: Arc<RequestCoordinator>,
    events: EventBus,
    polling: PollingConfig,
    connectivity: mpsc::Sender<ConnectivityState>,
    background: Vec<JoinHandle<()>>,
}

/// Builder for [`Session`] with fluent API
#[derive(Default)]
pub struct SessionBuilder {
    api: Option<Arc<dyn GithubClient>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    polling: PollingConfig,
    events: Option<EventBus>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the GitHub client
    pub fn api(mut self, api: Arc<dyn GithubClient>) -> Self {
        self.api = Some(api);
        self
    }

    /// Set the credential provider
    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set polling configuration
    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Publish on an existing bus instead of a fresh one
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the session; must run inside a Tokio runtime
    pub fn build(self) -> Result<Session> {
        let api = self
            .api
            .ok_or_else(|| ClientError::config("GitHub client is required"))?;
        let credentials = self
            .credentials
            .ok_or_else(|| ClientError::config("Credential provider is required"))?;
        let events = self.events.unwrap_or_default();

        // subscribe before reading, so no change falls between the two
        let mut changes = credentials.subscribe();
        let authorized = changes.borrow_and_update().is_some();

        let coordinator = Arc::new(RequestCoordinator::new(api, credentials, events.clone()));
        let scheduler =
            PollScheduler::new(coordinator.clone(), events.clone(), &self.polling, authorized)?;

        let (connectivity, signals) = mpsc::channel(CONNECTIVITY_BUFFER);
        let background = vec![
            spawn_credential_watcher(changes, scheduler.clone()),
            tokio::spawn(ConnectivityMonitor::new().run(signals, scheduler.clone(), events.clone())),
        ];

        Ok(Session {
            scheduler,
            coordinator,
            events,
            polling: self.polling,
            connectivity,
            background,
        })
    }
}

fn spawn_credential_watcher(
    mut changes: watch::Receiver<Option<Credential>>,
    scheduler: PollScheduler,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let present = changes.borrow_and_update().is_some();
            if present {
                scheduler.reauthorize();
            } else {
                scheduler.revoke_authorization();
            }
        }
        debug!("Credential provider closed");
    })
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Start every task at its configured interval; the first poll runs now
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<()> {
        info!(
            status_interval = ?self.polling.status_interval,
            repositories_interval = ?self.polling.repositories_interval,
            "Starting session"
        );
        for task in TaskId::ALL {
            self.scheduler.start(task, self.polling.interval(task))?;
        }
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubbyEvent> {
        self.events.subscribe()
    }

    /// Inbound side for platform reachability signals
    pub fn connectivity_sender(&self) -> mpsc::Sender<ConnectivityState> {
        self.connectivity.clone()
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn task(&self, task: TaskId) -> Option<PollTask> {
        self.scheduler.task(task)
    }

    pub fn refresh_now(&self, task: TaskId) -> Result<()> {
        self.scheduler.refresh_now(task)
    }

    /// Interval change from the configuration source
    pub fn set_interval(&self, task: TaskId, interval: Duration) -> Result<()> {
        self.scheduler.set_interval(task, interval)
    }

    /// Interval change from a preference value in seconds.
    ///
    /// Zero and negative values fail with a config error.
    pub fn set_interval_secs(&self, task: TaskId, seconds: i64) -> Result<()> {
        let seconds = u64::try_from(seconds)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| {
                ClientError::config_validation(
                    format!("{task} interval"),
                    format!("Polling interval must be a positive number of seconds, got {seconds}"),
                )
            })?;
        self.set_interval(task, Duration::from_secs(seconds))
    }

    pub async fn create_repository(
        &self,
        name: impl Into<CompactString>,
        visibility: Visibility,
    ) -> PollResult<Repository> {
        self.create_repository_with(&NewRepository::new(name, visibility))
            .await
    }

    /// Create a repository; the repository list is refreshed on success
    pub async fn create_repository_with(&self, repository: &NewRepository) -> PollResult<Repository> {
        let report = self.coordinator.create_repository(repository).await;
        let created = report.result.is_success();
        let result = self.apply_write(report);

        if created && let Err(e) = self.refresh_now(TaskId::RepoList) {
            warn!(error = %e, "Could not refresh repositories after creation");
        }
        result
    }

    pub async fn create_gist(&self, gist: &NewGist) -> PollResult<Gist> {
        let report = self.coordinator.create_gist(gist).await;
        self.apply_write(report)
    }

    fn apply_write<T>(&self, report: WriteReport<T>) -> PollResult<T> {
        if report.followup == Followup::Revoked {
            self.scheduler.revoke_authorization();
        }
        report.result
    }

    /// Cancel timers and background listeners
    pub fn shutdown(&mut self) {
        info!("Shutting down session");
        for handle in self.background.drain(..) {
            handle.abort();
        }
        self.scheduler.shutdown();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.background.is_empty() {
            self.shutdown();
        }
    }
}
