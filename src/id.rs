use serde::{Deserialize, Serialize};

/// Identifies one of the recurring poll tasks.
///
/// There is exactly one task per kind in a session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskId {
    /// GitHub service status, unauthenticated
    Status,
    /// Repositories of the authenticated user
    RepoList,
}

/// Write operations that may be outstanding at most once each.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum WriteKind {
    CreateRepository,
    CreateGist,
}

impl TaskId {
    pub const ALL: [TaskId; 2] = [TaskId::Status, TaskId::RepoList];

    /// Whether the task's request carries the user's credential
    pub fn requires_authorization(&self) -> bool {
        match self {
            TaskId::Status => false,
            TaskId::RepoList => true,
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TaskId::Status => write!(f, "status"),
            TaskId::RepoList => write!(f, "repo-list"),
        }
    }
}

impl std::fmt::Display for WriteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            WriteKind::CreateRepository => write!(f, "create-repository"),
            WriteKind::CreateGist => write!(f, "create-gist"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_repo_list_needs_a_credential() {
        assert!(!TaskId::Status.requires_authorization());
        assert!(TaskId::RepoList.requires_authorization());
    }

    #[test]
    fn displays_kebab_case() {
        assert_eq!(TaskId::RepoList.to_string(), "repo-list");
        assert_eq!(WriteKind::CreateGist.to_string(), "create-gist");
    }
}
