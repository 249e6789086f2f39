//! Error type for the command line front end

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Core(#[from] studio_core::Error),

    #[error("Invalid argument: {0}")]
    Usage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid class file: {0}")]
    Draft(#[from] toml::de::Error),
}

impl AppError {
    /// Stable code printed alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG",
            AppError::Core(e) => e.kind().as_str(),
            AppError::Usage(_) | AppError::Draft(_) => "VALIDATION",
            AppError::Io(_) => "STORAGE",
        }
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
