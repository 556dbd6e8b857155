//! GitHub client and polling engine
//!
//! `api` talks HTTP, `service` coordinates requests and classifies their
//! outcomes, `poller` owns the timers, and `task` holds the per-task state
//! the two share.

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod poller;
pub mod service;
pub mod task;

// Re-export main types for convenience
pub use api::{GithubApi, GithubClient};
pub use config::{ClientConfig, PollingConfig};
pub use credentials::{Credential, CredentialProvider, CredentialStore};
pub use error::{ClientError, ErrorKind};
pub use poller::PollScheduler;
pub use service::RequestCoordinator;
pub use task::PollTask;

pub type Result<T> = std::result::Result<T, ClientError>;
