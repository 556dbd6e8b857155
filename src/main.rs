use std::{collections::BTreeMap, path::PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{self, WrapErr, eyre};
use compact_str::CompactString;
use hubby::{
    HubbyEvent, PollResult,
    app_init::{AppComponents, initialize_app, open_status_page},
    client::{ClientError, CredentialProvider, GithubClient},
    config::default_config_path,
    domain::{NewGistBuilder, NewRepositoryBuilder, Repository, ServiceStatus, Visibility},
    id::TaskId,
};
use itertools::Itertools;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file; created with defaults when missing
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// GitHub token, overrides the config file and GITHUB_TOKEN
    #[arg(long, global = true)]
    token: Option<String>,

    /// Store the `--token` value in the configuration file
    #[arg(long, global = true, requires = "token")]
    save_token: bool,

    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll status and repositories until interrupted
    Run,
    /// Print the current GitHub service status
    Status,
    /// List repositories for the token's user
    Repos,
    CreateRepo {
        name: String,
        #[arg(long)]
        private: bool,
        #[arg(long)]
        description: Option<String>,
    },
    /// Upload a file as a new gist
    CreateGist {
        file: PathBuf,
        #[arg(long)]
        public: bool,
        #[arg(long)]
        description: Option<String>,
    },
    /// Open githubstatus.com in the browser
    OpenStatus,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let app = initialize_app(config_path, cli.token, cli.debug, cli.save_token)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&app).await,
        Command::Status => {
            let status = app.api.fetch_status().await?;
            println!("{}", format_status(&status));
            Ok(())
        },
        Command::Repos => {
            let credential = app
                .credentials
                .credential()
                .ok_or(ClientError::MissingCredential)?;
            let repos = app.api.list_repositories(&credential).await?;
            println!("{}", repos.iter().map(format_repository).join("\n"));
            Ok(())
        },
        Command::CreateRepo { name, private, description } => {
            let mut builder = NewRepositoryBuilder::default();
            builder
                .name(name)
                .visibility(if private { Visibility::Private } else { Visibility::Public });
            if let Some(description) = description {
                builder.description(description);
            }
            let repository = builder.build()?;

            let report = app.coordinator().create_repository(&repository).await;
            let repository = into_result(report.result)?;
            println!("{}", format_repository(&repository));
            Ok(())
        },
        Command::CreateGist { file, public, description } => {
            let content = std::fs::read_to_string(&file)
                .wrap_err_with(|| format!("Failed to read {}", file.display()))?;
            let name = file
                .file_name()
                .map(|n| CompactString::from(n.to_string_lossy()))
                .ok_or_else(|| eyre!("{} is not a file", file.display()))?;

            let mut builder = NewGistBuilder::default();
            builder
                .public(public)
                .files(BTreeMap::from([(name, content)]));
            if let Some(description) = description {
                builder.description(description);
            }
            let gist = builder.build()?;

            let report = app.coordinator().create_gist(&gist).await;
            let gist = into_result(report.result)?;
            println!("{}", gist.url);
            Ok(())
        },
        Command::OpenStatus => {
            open_status_page(&app.config.status_page_url)?;
            Ok(())
        },
    }
}

async fn run(app: &AppComponents) -> eyre::Result<()> {
    let mut session = app.session()?;
    let mut events = session.subscribe();
    let probe = app.spawn_probe(&session);
    session.start()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => report(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event consumer lagging"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    probe.abort();
    session.shutdown();
    info!("Hubby stopped");
    Ok(())
}

fn report(event: &HubbyEvent) {
    debug!(event = event.variant_name(), "Session event");
    match event {
        HubbyEvent::StatusUpdated(PollResult::Success(status)) => {
            println!("{}", format_status(status))
        },
        HubbyEvent::RepositoriesUpdated(PollResult::Success(repos)) => {
            println!("{} repositories: {}", repos.len(), repos.iter().map(|r| &r.full_name).join(", "))
        },
        HubbyEvent::StatusUpdated(PollResult::Failure(kind, message))
        | HubbyEvent::RepositoriesUpdated(PollResult::Failure(kind, message)) => {
            eprintln!("{kind}: {message}")
        },
        HubbyEvent::AuthorizationRevoked => {
            eprintln!("GitHub token rejected, repository polling stopped")
        },
        HubbyEvent::Reauthorized => println!("GitHub token accepted, polling {}", TaskId::RepoList),
        HubbyEvent::ConnectivityChanged(state) => println!("Connectivity: {state:?}"),
        HubbyEvent::RepositoryCreated(_) | HubbyEvent::GistCreated(_) => {},
    }
}

fn into_result<T>(result: PollResult<T>) -> eyre::Result<T> {
    match result {
        PollResult::Success(value) => Ok(value),
        PollResult::Failure(kind, message) => Err(eyre!("{kind}: {message}")),
    }
}

fn format_status(status: &ServiceStatus) -> String {
    let updated = status
        .updated_at
        .map(|t| format!(" (updated {})", t.format("%Y-%m-%d %H:%M UTC")))
        .unwrap_or_default();
    format!("GitHub: {}{updated}", status.description)
}

fn format_repository(repo: &Repository) -> String {
    let visibility = repo.visibility.to_string();
    [
        repo.full_name.as_str(),
        visibility.as_str(),
        repo.url.as_str(),
        repo.description.as_deref().unwrap_or(""),
    ]
    .iter()
    .filter(|s| !s.is_empty())
    .join("  ")
}
