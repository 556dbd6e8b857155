use std::path::{Path, PathBuf};

use compact_str::{CompactString, ToCompactString};
use thiserror::Error;

use crate::client::ClientError;

pub type Result<T> = std::result::Result<T, HubbyError>;

/// Application-level failures; engine failures arrive wrapped in `Client`
#[derive(Debug, Clone, Error)]
pub enum HubbyError {
    #[error("Cannot read {}: {message}", path.display())]
    ConfigLoad { path: PathBuf, message: CompactString },

    #[error("Cannot write {}: {message}", path.display())]
    ConfigSave { path: PathBuf, message: CompactString },

    #[error("Invalid setting `{field}`: {message}")]
    ConfigValidation { field: CompactString, message: CompactString },

    #[error("Logging: {0}")]
    Logging(CompactString),

    #[error("Cannot open {url}: {message}")]
    Browser { url: CompactString, message: CompactString },

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl HubbyError {
    pub fn config_load(path: &Path, source: impl std::fmt::Display) -> Self {
        Self::ConfigLoad { path: path.to_path_buf(), message: source.to_compact_string() }
    }

    pub fn config_save(path: &Path, source: impl std::fmt::Display) -> Self {
        Self::ConfigSave { path: path.to_path_buf(), message: source.to_compact_string() }
    }

    pub fn config_validation(
        field: impl Into<CompactString>,
        message: impl Into<CompactString>,
    ) -> Self {
        Self::ConfigValidation { field: field.into(), message: message.into() }
    }

    pub fn logging(source: impl std::fmt::Display) -> Self {
        Self::Logging(source.to_compact_string())
    }
}
