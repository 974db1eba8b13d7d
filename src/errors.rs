// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevloopError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("command '{id}' must set exactly one of `exec`, `apply` or `composite`")]
    CommandKind { id: String },

    #[error("component '{component}' has no image to run")]
    MissingImage { component: String },

    #[error("exec of command '{command}' in container '{container}' failed: {source}")]
    Exec {
        command: String,
        container: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("command '{id}' exited with code {exit_code}")]
    CommandFailed { id: String, exit_code: i32 },

    #[error("command '{id}' failed in job '{job}'")]
    JobFailed { id: String, job: String },

    #[error("unsupported on this platform: {0}")]
    Unsupported(String),

    #[error("timed out waiting for {description}{}", timeout_suffix(.last))]
    RetryTimeout {
        description: String,
        last: Option<anyhow::Error>,
    },

    #[error("file watch error: {0}")]
    Watch(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DevloopError {
    /// True for the "operation not available on this platform" case, which
    /// callers usually downgrade to a skip.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DevloopError::Unsupported(_))
    }
}

fn timeout_suffix(last: &Option<anyhow::Error>) -> String {
    match last {
        Some(err) => format!(": {err}"),
        None => String::new(),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DevloopError>;
