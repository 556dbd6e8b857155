use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::client::error::{ClientError, Result};

/// Overall health as reported by the status page
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusIndicator {
    /// All systems operational
    None,
    Minor,
    Major,
    Critical,
    Maintenance,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceStatus {
    pub indicator: StatusIndicator,
    /// Human readable summary, e.g. "All Systems Operational"
    pub description: CompactString,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Repository {
    pub full_name: CompactString,
    pub description: Option<CompactString>,
    pub default_branch: CompactString,
    pub url: CompactString,
    pub ssh_git_url: CompactString,
    pub visibility: Visibility,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Gist {
    pub id: CompactString,
    pub url: CompactString,
    pub public: bool,
}

/// Successful payload of a poll task; the variant follows the task kind
#[derive(Clone, Debug, PartialEq)]
pub enum TaskPayload {
    Status(ServiceStatus),
    Repositories(Vec<Repository>),
}

/// Parameters for `POST /user/repos`
#[derive(Clone, Debug, PartialEq, Builder)]
#[builder(setter(into))]
pub struct NewRepository {
    pub name: CompactString,
    #[builder(default)]
    pub visibility: Visibility,
    #[builder(default, setter(into, strip_option))]
    pub description: Option<CompactString>,
}

/// Parameters for `POST /gists`
#[derive(Clone, Debug, PartialEq, Builder)]
#[builder(setter(into))]
pub struct NewGist {
    #[builder(default, setter(into, strip_option))]
    pub description: Option<CompactString>,
    #[builder(default)]
    pub public: bool,
    /// File name to content
    #[builder(default)]
    pub files: BTreeMap<CompactString, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusPageDto {
    #[serde(default)]
    pub page: Option<StatusPageInfoDto>,
    pub status: StatusDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusPageInfoDto {
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusDto {
    #[serde(default)]
    pub indicator: StatusIndicator,
    pub description: CompactString,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryDto {
    pub full_name: CompactString,
    pub description: Option<CompactString>,
    #[serde(default = "default_branch")]
    pub default_branch: CompactString,
    #[serde(default)]
    pub ssh_url: CompactString,
    pub html_url: CompactString,
    #[serde(default)]
    pub private: bool,
    pub updated_at: DateTime<Utc>,
}

fn default_branch() -> CompactString {
    "main".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GistDto {
    pub id: CompactString,
    pub html_url: CompactString,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRepositoryBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    private: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateGistBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    public: bool,
    files: BTreeMap<&'a str, GistFileBody<'a>>,
}

#[derive(Debug, Serialize)]
struct GistFileBody<'a> {
    content: &'a str,
}

impl ServiceStatus {
    pub fn is_operational(&self) -> bool {
        self.indicator == StatusIndicator::None
    }
}

impl NewRepository {
    pub fn new(name: impl Into<CompactString>, visibility: Visibility) -> Self {
        Self { name: name.into(), visibility, description: None }
    }

    /// Checks the name against GitHub's repository naming rules
    pub fn validate(&self) -> Result<()> {
        let name = self.name.as_str();
        if name.trim().is_empty() {
            return Err(ClientError::config_validation("name", "Repository name cannot be empty"));
        }
        if name.len() > 100 {
            return Err(ClientError::config_validation(
                "name",
                "Repository name must be at most 100 characters",
            ));
        }
        if name == "." || name == ".." {
            return Err(ClientError::config_validation("name", "Repository name is reserved"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(ClientError::config_validation(
                "name",
                "Repository name may only contain ASCII letters, digits, '-', '_' and '.'",
            ));
        }
        Ok(())
    }

    pub(crate) fn body(&self) -> CreateRepositoryBody<'_> {
        CreateRepositoryBody {
            name: &self.name,
            description: self.description.as_deref(),
            private: self.visibility == Visibility::Private,
        }
    }
}

impl NewGist {
    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(ClientError::config_validation("files", "A gist needs at least one file"));
        }
        if let Some((name, _)) = self
            .files
            .iter()
            .find(|(name, content)| name.trim().is_empty() || content.trim().is_empty())
        {
            return Err(ClientError::config_validation(
                "files",
                format!("Gist file '{name}' needs a name and non-empty content"),
            ));
        }
        Ok(())
    }

    pub(crate) fn body(&self) -> CreateGistBody<'_> {
        CreateGistBody {
            description: self.description.as_deref(),
            public: self.public,
            files: self
                .files
                .iter()
                .map(|(name, content)| (name.as_str(), GistFileBody { content }))
                .collect(),
        }
    }
}

impl From<StatusPageDto> for ServiceStatus {
    fn from(dto: StatusPageDto) -> Self {
        Self {
            indicator: dto.status.indicator,
            description: dto.status.description,
            updated_at: dto.page.and_then(|p| p.updated_at),
        }
    }
}

impl From<RepositoryDto> for Repository {
    fn from(r: RepositoryDto) -> Self {
        Self {
            full_name: r.full_name,
            description: r.description,
            default_branch: r.default_branch,
            url: r.html_url,
            ssh_git_url: r.ssh_url,
            visibility: if r.private { Visibility::Private } else { Visibility::Public },
            updated_at: r.updated_at,
        }
    }
}

impl From<GistDto> for Gist {
    fn from(g: GistDto) -> Self {
        Self { id: g.id, url: g.html_url, public: g.public }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_statuspage_payload() {
        let json = r#"{
            "page": {"id": "kctbh9vrtdwd", "name": "GitHub", "updated_at": "2026-10-19T08:12:44.000Z"},
            "status": {"indicator": "minor", "description": "Partially Degraded Service"}
        }"#;
        let status: ServiceStatus = serde_json::from_str::<StatusPageDto>(json).unwrap().into();

        assert_eq!(status.indicator, StatusIndicator::Minor);
        assert_eq!(status.description, "Partially Degraded Service");
        assert!(status.updated_at.is_some());
        assert!(!status.is_operational());
    }

    #[test]
    fn unknown_indicator_is_tolerated() {
        let json = r#"{"status": {"indicator": "catastrophic", "description": "?"}}"#;
        let status: ServiceStatus = serde_json::from_str::<StatusPageDto>(json).unwrap().into();
        assert_eq!(status.indicator, StatusIndicator::Unknown);
    }

    #[test]
    fn private_flag_maps_to_visibility() {
        let json = r#"{
            "full_name": "octocat/hello",
            "description": null,
            "default_branch": "trunk",
            "html_url": "https://github.com/octocat/hello",
            "private": true,
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;
        let repo: Repository = serde_json::from_str::<RepositoryDto>(json).unwrap().into();
        assert_eq!(repo.visibility, Visibility::Private);
        assert_eq!(repo.default_branch, "trunk");
    }

    #[test]
    fn repository_names_are_validated() {
        assert!(NewRepository::new("hubby-rs.v2", Visibility::Public).validate().is_ok());
        assert!(NewRepository::new("", Visibility::Public).validate().is_err());
        assert!(NewRepository::new("..", Visibility::Private).validate().is_err());
        assert!(NewRepository::new("has space", Visibility::Public).validate().is_err());
        assert!(NewRepository::new("x".repeat(101), Visibility::Public).validate().is_err());
    }

    #[test]
    fn builder_fills_defaults() {
        let repo = NewRepositoryBuilder::default()
            .name("notes")
            .description("scratch space")
            .build()
            .unwrap();
        assert_eq!(repo.visibility, Visibility::Public);
        assert_eq!(repo.description.as_deref(), Some("scratch space"));

        let body = serde_json::to_value(repo.body()).unwrap();
        assert_eq!(body["private"], false);
        assert_eq!(body["name"], "notes");
    }

    #[test]
    fn gist_requires_content() {
        let empty = NewGistBuilder::default().build().unwrap();
        assert!(empty.validate().is_err());

        let mut files = BTreeMap::new();
        files.insert(CompactString::from("a.txt"), "  ".to_string());
        let blank = NewGistBuilder::default().files(files).build().unwrap();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn gist_body_nests_file_content() {
        let mut files = BTreeMap::new();
        files.insert(CompactString::from("hello.rs"), "fn main() {}".to_string());
        let gist = NewGistBuilder::default().public(true).files(files).build().unwrap();

        let body = serde_json::to_value(gist.body()).unwrap();
        assert_eq!(body["files"]["hello.rs"]["content"], "fn main() {}");
        assert_eq!(body["public"], true);
        assert!(body.get("description").is_none());
    }
}
