//! `studio.toml` loading and default locations

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use studio_core::UserId;
use thiserror::Error;

const CONFIG_FILE: &str = "studio.toml";
const DATABASE_FILE: &str = "studio.db";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine the {0} directory")]
    NoProjectDirs(&'static str),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Command line configuration, as read from `studio.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite file; the platform data directory when unset
    pub database_path: Option<PathBuf>,
    /// Users always treated as studio administrators
    pub admin_ids: Vec<String>,
    /// Tracing filter used when `RUST_LOG` is not set
    pub log_filter: Option<String>,
}

impl AppConfig {
    /// Load from `path`, or from the default location when `None`
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = default_config_path()?;
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join(DATABASE_FILE)),
        }
    }

    pub fn admin_ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.admin_ids.iter().map(|id| UserId::new(id.as_str()))
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or("info")
    }
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("dev", "studio", "studio").ok_or(ConfigError::NoProjectDirs("home"))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(project_dirs()?.config_dir().join(CONFIG_FILE))
}
