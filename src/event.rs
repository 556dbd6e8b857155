use compact_str::CompactString;

use crate::{
    client::error::{ClientError, ErrorKind},
    connectivity::ConnectivityState,
    domain::{Gist, Repository, ServiceStatus, TaskPayload},
    id::TaskId,
};

/// Outcome of one request as seen by subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult<T> {
    Success(T),
    Failure(ErrorKind, CompactString),
}

impl<T> PollResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, PollResult::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            PollResult::Success(_) => None,
            PollResult::Failure(kind, _) => Some(*kind),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PollResult<U> {
        match self {
            PollResult::Success(value) => PollResult::Success(f(value)),
            PollResult::Failure(kind, message) => PollResult::Failure(kind, message),
        }
    }
}

impl<T> From<&ClientError> for PollResult<T> {
    fn from(e: &ClientError) -> Self {
        PollResult::Failure(e.kind(), e.to_string().into())
    }
}

impl<T> From<Result<T, ClientError>> for PollResult<T> {
    fn from(result: Result<T, ClientError>) -> Self {
        match result {
            Ok(value) => PollResult::Success(value),
            Err(e) => PollResult::from(&e),
        }
    }
}

/// Events published by the engine for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum HubbyEvent {
    StatusUpdated(PollResult<ServiceStatus>),
    RepositoriesUpdated(PollResult<Vec<Repository>>),
    RepositoryCreated(PollResult<Repository>),
    GistCreated(PollResult<Gist>),
    AuthorizationRevoked,
    Reauthorized,
    ConnectivityChanged(ConnectivityState),
}

impl HubbyEvent {
    /// Get the variant name as a string slice (without "HubbyEvent::" prefix)
    pub fn variant_name(&self) -> &'static str {
        match self {
            HubbyEvent::StatusUpdated(_) => "StatusUpdated",
            HubbyEvent::RepositoriesUpdated(_) => "RepositoriesUpdated",
            HubbyEvent::RepositoryCreated(_) => "RepositoryCreated",
            HubbyEvent::GistCreated(_) => "GistCreated",
            HubbyEvent::AuthorizationRevoked => "AuthorizationRevoked",
            HubbyEvent::Reauthorized => "Reauthorized",
            HubbyEvent::ConnectivityChanged(_) => "ConnectivityChanged",
        }
    }

    /// The update event for a finished poll of `task`
    pub fn task_outcome(task: TaskId, outcome: PollResult<TaskPayload>) -> Self {
        match (task, outcome) {
            (_, PollResult::Success(TaskPayload::Status(status))) => {
                HubbyEvent::StatusUpdated(PollResult::Success(status))
            },
            (_, PollResult::Success(TaskPayload::Repositories(repos))) => {
                HubbyEvent::RepositoriesUpdated(PollResult::Success(repos))
            },
            (TaskId::Status, PollResult::Failure(kind, message)) => {
                HubbyEvent::StatusUpdated(PollResult::Failure(kind, message))
            },
            (TaskId::RepoList, PollResult::Failure(kind, message)) => {
                HubbyEvent::RepositoriesUpdated(PollResult::Failure(kind, message))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_carry_kind_and_message() {
        let result: PollResult<()> = Err(ClientError::Timeout).into();
        assert_eq!(result, PollResult::Failure(ErrorKind::Network, "Request timeout".into()));
        assert_eq!(result.error_kind(), Some(ErrorKind::Network));
    }

    #[test]
    fn failed_repo_poll_becomes_repositories_update() {
        let event = HubbyEvent::task_outcome(
            TaskId::RepoList,
            PollResult::Failure(ErrorKind::Authorization, "Authentication failed".into()),
        );
        assert_eq!(event.variant_name(), "RepositoriesUpdated");
    }

    #[test]
    fn map_keeps_failures() {
        let failure: PollResult<u8> = PollResult::Failure(ErrorKind::Busy, "busy".into());
        assert_eq!(failure.map(|v| v + 1).error_kind(), Some(ErrorKind::Busy));
        assert_eq!(PollResult::Success(1u8).map(|v| v + 1), PollResult::Success(2));
    }
}
