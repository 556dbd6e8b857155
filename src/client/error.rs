//! Error types for the GitHub client and their classification

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use thiserror::Error;

use crate::id::WriteKind;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while talking to GitHub or validating a request
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(CompactString),

    #[error("Request timeout")]
    Timeout,

    #[error("JSON parse error from {endpoint}: {message}")]
    JsonParse { endpoint: CompactString, message: CompactString },

    #[error("GitHub API error: {message}")]
    GithubApi { status: u16, message: CompactString },

    #[error("Not found: {resource}")]
    NotFound { resource: CompactString },

    #[error("Authentication failed")]
    Authentication,

    #[error("The provided GitHub token is invalid")]
    InvalidToken,

    #[error("The provided GitHub token has expired")]
    ExpiredToken,

    #[error("Access forbidden: {message}")]
    Forbidden { message: CompactString },

    #[error("No credential available")]
    MissingCredential,

    #[error("Rate limit exceeded")]
    RateLimit { reset_at: Option<DateTime<Utc>> },

    #[error("Validation failed: {message}")]
    Validation { message: CompactString },

    #[error("Configuration error: {0}")]
    Config(CompactString),

    #[error("Invalid {field}: {message}")]
    ConfigValidation { field: CompactString, message: CompactString },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: CompactString },

    #[error("A {kind} request is already outstanding")]
    Busy { kind: WriteKind },
}

/// Coarse classification that decides how the engine reacts to a failure
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Transient; the task keeps its schedule
    Network,
    /// Fatal to authenticated tasks until re-authorization
    Authorization,
    /// Single-step backoff of the next tick
    RateLimit,
    /// Rejected at the call boundary, nothing changed
    Config,
    /// Duplicate write rejected
    Busy,
}

impl ClientError {
    pub fn config(message: impl Into<CompactString>) -> Self {
        Self::Config(message.into())
    }

    pub fn config_validation(
        field: impl Into<CompactString>,
        message: impl Into<CompactString>,
    ) -> Self {
        Self::ConfigValidation { field: field.into(), message: message.into() }
    }

    pub fn json_parse(endpoint: impl Into<CompactString>, source: serde_json::Error) -> Self {
        Self::JsonParse { endpoint: endpoint.into(), message: source.to_string().into() }
    }

    pub fn github_api(status: u16, message: impl Into<CompactString>) -> Self {
        Self::GithubApi { status, message: message.into() }
    }

    pub fn not_found(resource: impl Into<CompactString>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    pub fn rate_limit(reset_at: Option<DateTime<Utc>>) -> Self {
        Self::RateLimit { reset_at }
    }

    pub fn busy(kind: WriteKind) -> Self {
        Self::Busy { kind }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Http(_)
            | ClientError::Timeout
            | ClientError::JsonParse { .. }
            | ClientError::GithubApi { .. }
            | ClientError::NotFound { .. } => ErrorKind::Network,
            ClientError::Authentication
            | ClientError::InvalidToken
            | ClientError::ExpiredToken
            | ClientError::Forbidden { .. }
            | ClientError::MissingCredential => ErrorKind::Authorization,
            ClientError::RateLimit { .. } => ErrorKind::RateLimit,
            ClientError::Validation { .. }
            | ClientError::Config(_)
            | ClientError::ConfigValidation { .. }
            | ClientError::InvalidUrl { .. } => ErrorKind::Config,
            ClientError::Busy { .. } => ErrorKind::Busy,
        }
    }

    /// Server-provided instant at which a rate limit lifts
    pub fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        match self {
            ClientError::RateLimit { reset_at } => *reset_at,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Http(e.to_string().into())
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Network => "NetworkError",
            ErrorKind::Authorization => "AuthorizationError",
            ErrorKind::RateLimit => "RateLimitError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Busy => "BusyError",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_problems_are_authorization_failures() {
        for e in [
            ClientError::Authentication,
            ClientError::InvalidToken,
            ClientError::ExpiredToken,
            ClientError::MissingCredential,
            ClientError::Forbidden { message: "no".into() },
        ] {
            assert_eq!(e.kind(), ErrorKind::Authorization, "{e}");
        }
    }

    #[test]
    fn server_trouble_is_transient() {
        assert_eq!(ClientError::Timeout.kind(), ErrorKind::Network);
        assert_eq!(ClientError::github_api(502, "Bad Gateway").kind(), ErrorKind::Network);
        assert_eq!(ClientError::not_found("status").kind(), ErrorKind::Network);
    }

    #[test]
    fn rejected_parameters_are_config_errors() {
        assert_eq!(
            ClientError::Validation { message: "name already exists".into() }.kind(),
            ErrorKind::Config
        );
        assert_eq!(ClientError::config_validation("interval", "zero").kind(), ErrorKind::Config);
    }

    #[test]
    fn rate_limit_keeps_reset() {
        let reset = DateTime::from_timestamp(1_800_000_000, 0);
        let e = ClientError::rate_limit(reset);
        assert_eq!(e.kind(), ErrorKind::RateLimit);
        assert_eq!(e.rate_limit_reset(), reset);
        assert_eq!(ClientError::Timeout.rate_limit_reset(), None);
    }

    #[test]
    fn busy_names_the_write() {
        let e = ClientError::busy(WriteKind::CreateRepository);
        assert_eq!(e.kind(), ErrorKind::Busy);
        assert_eq!(e.to_string(), "A create-repository request is already outstanding");
    }
}
