//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading or validating a [`SwitchyardConfig`](super::SwitchyardConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A field holds a value the dispatcher cannot run with, e.g. a zero
    /// timeout or a duplicate entry in `dispatch.default_order`.
    #[error("Invalid value for '{field}': {message}")]
    Validation { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}
