use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use compact_str::ToCompactString;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::{
    client::{ClientConfig, Credential, CredentialStore, GithubApi, RequestCoordinator},
    config::{HubbyConfig, load_config, save_config},
    connectivity::ReachabilityProbe,
    dispatcher::EventBus,
    logging::{LoggingConfig, init_logging},
    result::{HubbyError, Result},
    session::Session,
};

pub struct AppComponents {
    pub config: HubbyConfig,
    pub api: Arc<GithubApi>,
    pub credentials: Arc<CredentialStore>,
    pub _log_guard: Option<WorkerGuard>,
}

pub fn initialize_app(
    config_path: PathBuf,
    token: Option<String>,
    debug: bool,
    save_token: bool,
) -> Result<AppComponents> {
    let mut config = load_config(&config_path)?;
    let log_guard = initialize_logging(&config, debug)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Hubby starting up"
    );

    if save_token {
        match token.as_deref() {
            Some(token) => remember_token(&config_path, &mut config, token)?,
            None => warn!("--save-token given without --token, nothing saved"),
        }
    }

    let api = Arc::new(GithubApi::new(ClientConfig::from(&config))?);
    let credentials = Arc::new(CredentialStore::new(resolve_token(token, &config)));

    Ok(AppComponents {
        config,
        api,
        credentials,
        _log_guard: log_guard,
    })
}

fn initialize_logging(config: &HubbyConfig, debug: bool) -> Result<Option<WorkerGuard>> {
    let level = if debug { Some("debug") } else { config.log_level.as_deref() };

    let logging_config = LoggingConfig::from_env()
        .with_default_filter(level)
        .with_log_dir(config.log_directory.clone());

    init_logging(logging_config)
}

/// Persist a command-line token so later runs pick it up
pub fn remember_token(config_path: &Path, config: &mut HubbyConfig, token: &str) -> Result<()> {
    config.github_token = Some(token.into());
    save_config(config_path, config)?;
    info!(config = %config_path.display(), "Saved GitHub token");
    Ok(())
}

/// Command line first, then the config file, then `GITHUB_TOKEN`
fn resolve_token(token: Option<String>, config: &HubbyConfig) -> Option<Credential> {
    token
        .map(Into::into)
        .or_else(|| config.github_token.clone())
        .or_else(|| std::env::var("GITHUB_TOKEN").ok().map(Into::into))
        .filter(|t| !t.trim().is_empty())
        .map(Credential::new)
}

impl AppComponents {
    /// Build a session over the shared client and credential store
    pub fn session(&self) -> Result<Session> {
        let session = Session::builder()
            .api(self.api.clone())
            .credentials(self.credentials.clone())
            .polling(self.api.config().polling)
            .build()?;
        Ok(session)
    }

    /// Coordinator for one-shot writes; nothing is polled afterwards
    pub fn coordinator(&self) -> RequestCoordinator {
        RequestCoordinator::new(self.api.clone(), self.credentials.clone(), EventBus::default())
    }

    /// Feed TCP reachability into the session's connectivity monitor
    pub fn spawn_probe(&self, session: &Session) -> JoinHandle<()> {
        ReachabilityProbe::new(
            self.config.probe_host.clone(),
            Duration::from_secs(self.config.probe_interval_secs),
        )
        .spawn(session.connectivity_sender())
    }
}

/// Open the public status page in the default browser
pub fn open_status_page(url: &str) -> Result<()> {
    info!(url, "Opening status page");
    open::that(url).map_err(|e| {
        warn!(url, error = %e, "Failed to open status page");
        HubbyError::Browser { url: url.into(), message: e.to_compact_string() }
    })
}
