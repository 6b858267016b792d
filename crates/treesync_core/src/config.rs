//! Synchronizer and application configuration.
//!
//! # Responsibility
//! - Carry the class policies the engine cannot infer from the store.
//! - Load CLI/application settings from TOML.
//!
//! # Invariants
//! - Every field has a default, so an empty document is a valid config.

use crate::logging::default_log_level;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Class policies consulted by `put` and `trim`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Relationship classes that express parent/child containment. Using one
    /// of them as a link between a parent and its own child is rejected.
    pub containment_classes: BTreeSet<String>,
    /// Element classes the store creates implicitly under their parent. They
    /// never block trimming of that parent and are removed along with it.
    pub exempt_child_classes: BTreeSet<String>,
}

impl SyncConfig {
    pub fn with_containment_class(mut self, class: impl Into<String>) -> Self {
        self.containment_classes.insert(class.into());
        self
    }

    pub fn with_exempt_child_class(mut self, class: impl Into<String>) -> Self {
        self.exempt_child_classes.insert(class.into());
        self
    }

    pub fn is_containment_class(&self, class: &str) -> bool {
        self.containment_classes.contains(class)
    }

    pub fn is_exempt_child(&self, class: &str) -> bool {
        self.exempt_child_classes.contains(class)
    }
}

/// Application-level settings for the `treesync` binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    /// Absolute directory for rolling log files. Logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    pub sync: SyncConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            sync: SyncConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

impl AppConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, ConfigError, SyncConfig};
    use std::path::PathBuf;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.sync.containment_classes.is_empty());
    }

    #[test]
    fn parses_sync_policies() {
        let config = AppConfig::from_toml_str(
            r#"
            database_path = "/tmp/graph.db"
            log_level = "debug"

            [sync]
            containment_classes = ["ElementOwnsChildElements"]
            exempt_child_classes = ["DefaultSubCategory"]
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/graph.db")));
        assert_eq!(config.log_level, "debug");
        assert!(config.sync.is_containment_class("ElementOwnsChildElements"));
        assert!(config.sync.is_exempt_child("DefaultSubCategory"));
        assert!(!config.sync.is_exempt_child("Category"));
    }

    #[test]
    fn rejects_malformed_documents() {
        let err = AppConfig::from_toml_str("sync = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn builder_methods_extend_policies() {
        let config = SyncConfig::default()
            .with_containment_class("Owns")
            .with_exempt_child_class("Implicit");
        assert!(config.is_containment_class("Owns"));
        assert!(config.is_exempt_child("Implicit"));
    }
}
