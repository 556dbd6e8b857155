//! Configuration management for the GitHub client

use std::time::Duration;

use compact_str::CompactString;

use super::error::{ClientError, Result};
use crate::{config::HubbyConfig, id::TaskId};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_STATUS_URL: &str = "https://www.githubstatus.com/api/v2/status.json";

/// Main configuration for the GitHub client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// GitHub REST API base URL
    pub api_url: CompactString,
    /// Statuspage `status.json` endpoint
    pub status_url: CompactString,
    /// Polling configuration
    pub polling: PollingConfig,
    /// Request configuration
    pub request: RequestConfig,
}

/// Polling intervals configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PollingConfig {
    /// Interval for fetching the service status
    pub status_interval: Duration,
    /// Interval for fetching the user's repositories
    pub repositories_interval: Duration,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Number of repositories per page
    pub per_page: u32,
    /// Request timeout, surfaced as a transient failure
    pub timeout: Duration,
    pub user_agent: CompactString,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(60),
            repositories_interval: Duration::from_secs(300),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self, task: TaskId) -> Duration {
        match task {
            TaskId::Status => self.status_interval,
            TaskId::RepoList => self.repositories_interval,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            per_page: 100,
            timeout: Duration::from_secs(30),
            user_agent: concat!("hubby/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL, DEFAULT_STATUS_URL)
    }
}

impl ClientConfig {
    pub fn new(api_url: impl Into<CompactString>, status_url: impl Into<CompactString>) -> Self {
        Self {
            api_url: api_url.into(),
            status_url: status_url.into(),
            polling: PollingConfig::default(),
            request: RequestConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_url("api_url", &self.api_url)?;
        validate_url("status_url", &self.status_url)?;

        if self.request.per_page == 0 || self.request.per_page > 100 {
            return Err(ClientError::config_validation(
                "per_page",
                "per_page must be between 1 and 100",
            ));
        }

        if self.request.timeout.is_zero() {
            return Err(ClientError::config_validation(
                "timeout",
                "Timeout must be greater than zero",
            ));
        }

        for task in TaskId::ALL {
            if self.polling.interval(task).is_zero() {
                return Err(ClientError::config_validation(
                    format!("{task} interval"),
                    "Polling interval must be greater than zero",
                ));
            }
        }

        Ok(())
    }

    /// Set polling configuration
    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Set request configuration
    pub fn with_request(mut self, request: RequestConfig) -> Self {
        self.request = request;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = timeout;
        self
    }
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ClientError::config_validation(field, "URL cannot be empty"));
    }

    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ClientError::config_validation(
            field,
            "URL must start with http:// or https://",
        ));
    }

    if url::Url::parse(value).is_err() {
        return Err(ClientError::InvalidUrl { url: value.into() });
    }

    Ok(())
}

impl From<&HubbyConfig> for ClientConfig {
    fn from(config: &HubbyConfig) -> Self {
        Self::new(config.api_url.clone(), config.status_url.clone())
            .with_polling(PollingConfig {
                status_interval: Duration::from_secs(config.status_interval_secs),
                repositories_interval: Duration::from_secs(config.repositories_interval_secs),
            })
            .with_timeout(Duration::from_secs(config.request_timeout_secs))
    }
}
