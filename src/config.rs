use std::path::{Path, PathBuf};

use compact_str::CompactString;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::{
    client::config::{DEFAULT_API_URL, DEFAULT_STATUS_URL},
    result::{HubbyError, Result},
};

/// Persisted preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubbyConfig {
    pub api_url: CompactString,
    pub status_url: CompactString,
    /// Opened by `open-status`
    pub status_page_url: CompactString,
    pub github_token: Option<CompactString>,
    pub status_interval_secs: u64,
    pub repositories_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// `host:port` used to detect network reachability
    pub probe_host: CompactString,
    pub probe_interval_secs: u64,
    pub log_level: Option<CompactString>,
    pub log_directory: Option<PathBuf>,
}

impl Default for HubbyConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            status_url: DEFAULT_STATUS_URL.into(),
            status_page_url: "https://www.githubstatus.com".into(),
            github_token: None,
            status_interval_secs: 60,
            repositories_interval_secs: 300,
            request_timeout_secs: 30,
            probe_host: "api.github.com:443".into(),
            probe_interval_secs: 15,
            log_level: None,
            log_directory: None,
        }
    }
}

impl HubbyConfig {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("status_interval_secs", self.status_interval_secs),
            ("repositories_interval_secs", self.repositories_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("probe_interval_secs", self.probe_interval_secs),
        ] {
            if value == 0 {
                return Err(HubbyError::config_validation(field, "must be greater than zero"));
            }
        }

        if self.probe_host.rsplit_once(':').is_none() {
            return Err(HubbyError::config_validation("probe_host", "expected host:port"));
        }

        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(dirs) = BaseDirs::new() {
        dirs.config_dir().join("hubby.toml")
    } else {
        PathBuf::from("hubby.toml")
    }
}

/// Load the configuration, creating a default file when none exists
pub fn load_config(config_file: &Path) -> Result<HubbyConfig> {
    let config: HubbyConfig = confy::load_path(config_file)
        .map_err(|e| HubbyError::config_load(config_file, e))?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(config_file: &Path, config: &HubbyConfig) -> Result<()> {
    confy::store_path(config_file, config)
        .map_err(|e| HubbyError::config_save(config_file, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(HubbyConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = HubbyConfig { repositories_interval_secs: 0, ..Default::default() };
        assert!(matches!(
            config.validate(),
            Err(HubbyError::ConfigValidation { field, .. }) if field == "repositories_interval_secs"
        ));
    }

    #[test]
    fn round_trips_through_disk() {
        let path = std::env::temp_dir().join(format!("hubby-config-{}.toml", std::process::id()));
        let config = HubbyConfig {
            github_token: Some("ghp_0123456789abcdefghij".into()),
            status_interval_secs: 120,
            ..Default::default()
        };

        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }
}
