//! Error types and handling
//!
//! Errors raised by the command-line driver around the recording core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not read settings {}: {source}", path.display())]
    SettingsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid settings {}: {source}", path.display())]
    SettingsParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Show error: {0}")]
    Show(String),

    #[error("Delivery to {destination} failed: {reason}")]
    Delivery { destination: String, reason: String },
}

/// Machine-readable error summary
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::SettingsRead { .. } | AppError::SettingsParse { .. } => "SETTINGS_ERROR",
            AppError::Show(_) => "SHOW_ERROR",
            AppError::Delivery { .. } => "DELIVERY_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
