//! Core HTTP client for the GitHub API and status page

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compact_str::{CompactString, format_compact};
use reqwest::{Client, Method, RequestBuilder, Response, header::HeaderMap};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{
    config::ClientConfig,
    credentials::Credential,
    error::{ClientError, Result},
};
use crate::domain::{
    Gist, GistDto, NewGist, NewRepository, Repository, RepositoryDto, ServiceStatus,
    StatusPageDto,
};

/// Request functions the engine needs from GitHub
///
/// Every call either yields a typed payload or a classified [`ClientError`].
#[async_trait]
pub trait GithubClient: Send + Sync {
    /// `GET status.json`, unauthenticated
    async fn fetch_status(&self) -> Result<ServiceStatus>;

    /// `GET /user/repos`, in server response order
    async fn list_repositories(&self, credential: &Credential) -> Result<Vec<Repository>>;

    /// `POST /user/repos`
    async fn create_repository(
        &self,
        credential: &Credential,
        repository: &NewRepository,
    ) -> Result<Repository>;

    /// `POST /gists`
    async fn create_gist(&self, credential: &Credential, gist: &NewGist) -> Result<Gist>;
}

/// reqwest-backed GitHub client
#[derive(Debug)]
pub struct GithubApi {
    client: RwLock<Client>,
    config: RwLock<ClientConfig>,
}

/// OAuth-style error body
#[derive(Debug, Deserialize)]
struct OAuthError {
    error: CompactString,
    error_description: Option<CompactString>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: CompactString,
}

impl GithubApi {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = Self::build_client(&config)?;

        Ok(Self {
            client: RwLock::new(client),
            config: RwLock::new(config),
        })
    }

    /// Update configuration
    pub fn update_config(&self, config: ClientConfig) -> Result<()> {
        config.validate()?;
        let client = Self::build_client(&config)?;

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = client;

        Ok(())
    }

    /// Get current configuration
    pub fn config(&self) -> ClientConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn build_client(config: &ClientConfig) -> Result<Client> {
        Client::builder()
            .timeout(config.request.timeout)
            .user_agent(config.request.user_agent.as_str())
            .build()
            .map_err(ClientError::from)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .request(method, url)
    }

    /// Create authenticated request builder
    fn authenticated_request(
        &self,
        method: Method,
        url: &str,
        credential: &Credential,
    ) -> RequestBuilder {
        self.request(method, url)
            .header("Authorization", format!("token {}", credential.expose()))
            .header("Accept", "application/vnd.github.v3+json")
    }

    /// Handle HTTP response and deserialize JSON
    async fn handle_response<T>(&self, response: Response) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url_path = response.url().path().to_string();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        debug!(path = %url_path, status = status.as_u16(), bytes = body.len(), "Response received");

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| ClientError::json_parse(url_path, e))
        } else {
            Err(classify_error_response(status.as_u16(), &headers, &body))
        }
    }
}

#[async_trait]
impl GithubClient for GithubApi {
    #[instrument(skip(self))]
    async fn fetch_status(&self) -> Result<ServiceStatus> {
        let url = self.config().status_url;
        let response = self
            .request(Method::GET, &url)
            .header("Accept", "application/json")
            .send()
            .await?;
        let status: StatusPageDto = self.handle_response(response).await?;
        Ok(status.into())
    }

    #[instrument(skip(self, credential))]
    async fn list_repositories(&self, credential: &Credential) -> Result<Vec<Repository>> {
        let url = {
            let config = self.config();
            format_compact!(
                "{}/user/repos?type=all&sort=updated&direction=desc&per_page={}",
                config.api_url.trim_end_matches('/'),
                config.request.per_page
            )
        };

        let response = self
            .authenticated_request(Method::GET, &url, credential)
            .send()
            .await?;
        let repos: Vec<RepositoryDto> = self.handle_response(response).await?;
        debug!(repository_count = repos.len(), "Successfully fetched repositories");
        Ok(repos.into_iter().map(Repository::from).collect())
    }

    #[instrument(skip(self, credential), fields(name = %repository.name, visibility = %repository.visibility))]
    async fn create_repository(
        &self,
        credential: &Credential,
        repository: &NewRepository,
    ) -> Result<Repository> {
        repository.validate()?;
        let url = format_compact!("{}/user/repos", self.config().api_url.trim_end_matches('/'));

        let response = self
            .authenticated_request(Method::POST, &url, credential)
            .json(&repository.body())
            .send()
            .await?;
        let created: RepositoryDto = self.handle_response(response).await?;
        Ok(created.into())
    }

    #[instrument(skip(self, credential, gist), fields(files = gist.files.len(), public = gist.public))]
    async fn create_gist(&self, credential: &Credential, gist: &NewGist) -> Result<Gist> {
        gist.validate()?;
        let url = format_compact!("{}/gists", self.config().api_url.trim_end_matches('/'));

        let response = self
            .authenticated_request(Method::POST, &url, credential)
            .json(&gist.body())
            .send()
            .await?;
        let created: GistDto = self.handle_response(response).await?;
        Ok(created.into())
    }
}

/// Map a non-success response onto a [`ClientError`]
fn classify_error_response(status: u16, headers: &HeaderMap, body: &str) -> ClientError {
    match status {
        401 => {
            // OAuth apps report token problems in `error`
            if let Ok(api_error) = serde_json::from_str::<OAuthError>(body) {
                match api_error.error.as_str() {
                    "invalid_token" => ClientError::InvalidToken,
                    "expired_token" => ClientError::ExpiredToken,
                    _ => match &api_error.error_description {
                        Some(description)
                            if description.contains("expired") || description.contains("expiry") =>
                        {
                            ClientError::ExpiredToken
                        },
                        _ => ClientError::Authentication,
                    },
                }
            } else {
                ClientError::Authentication
            }
        },
        403 => {
            let message = error_message(body);
            if header_str(headers, "x-ratelimit-remaining") == Some("0")
                || message.to_ascii_lowercase().contains("rate limit")
            {
                ClientError::rate_limit(rate_limit_reset(headers))
            } else {
                ClientError::Forbidden { message }
            }
        },
        404 => ClientError::not_found("Resource"),
        422 => ClientError::Validation { message: error_message(body) },
        429 => ClientError::rate_limit(rate_limit_reset(headers)),
        _ => ClientError::github_api(status, format_compact!("HTTP {}: {}", status, error_message(body))),
    }
}

fn error_message(body: &str) -> CompactString {
    if let Ok(api_error) = serde_json::from_str::<ApiMessage>(body) {
        api_error.message
    } else if let Ok(api_error) = serde_json::from_str::<OAuthError>(body) {
        format_compact!(
            "{} {}",
            api_error.error,
            api_error.error_description.unwrap_or_default()
        )
        .trim_end()
        .into()
    } else {
        body.into()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Reset instant from `retry-after` (seconds) or `x-ratelimit-reset` (epoch seconds)
fn rate_limit_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    if let Some(seconds) = header_str(headers, "retry-after").and_then(|v| v.trim().parse::<i64>().ok()) {
        return Some(Utc::now() + chrono::Duration::seconds(seconds));
    }

    header_str(headers, "x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
}
