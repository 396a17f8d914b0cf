//! Error types for promotion runs.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for promotion operations.
#[derive(Error, Debug)]
pub enum PromoteError {
    #[error("Invalid promotion request: {message}")]
    InvalidRequest { message: String },

    #[error("Environment '{name}' not found in namespace '{namespace}'")]
    EnvironmentNotFound { namespace: String, name: String },

    #[error("Environment registry unavailable: {message}")]
    RegistryUnavailable { message: String },

    #[error("No version of '{application}' found in the version stream")]
    VersionNotFound { application: String },

    #[error("Version stream unavailable: {message}")]
    VersionStreamUnavailable { message: String },

    #[error("Repository {url} unavailable: {message}")]
    RepositoryUnavailable { url: String, message: String },

    #[error("Unsupported repository layout at {path}: no known declaration file found")]
    UnsupportedLayout { path: PathBuf },

    #[error("Malformed declaration file {path}: {message}")]
    MalformedDeclaration { path: PathBuf, message: String },

    #[error("Push of branch '{branch}' rejected: {message}")]
    PushRejected { branch: String, message: String },

    #[error("Pull request {link} was closed without being merged")]
    PromotionRejected { link: String },

    #[error("Timed out after {attempts} polls waiting for pull request {link} to merge")]
    PromotionTimeout { link: String, attempts: u32 },

    #[error("Promotion cancelled")]
    Cancelled,

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Source control host error: {message}")]
    Host { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failure classes callers use to decide whether a run may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad application, version or environment reference.
    Input,
    /// Registry, version stream, git transport or host API failure.
    Infrastructure,
    /// An external decision conflicts with the promotion.
    Conflict,
    /// Merge polling exceeded its bound.
    Timeout,
    /// Repository content this crate refuses to touch.
    Unsupported,
    /// The invocation was cancelled by the caller.
    Cancelled,
}

impl PromoteError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. }
            | Self::EnvironmentNotFound { .. }
            | Self::VersionNotFound { .. }
            | Self::InvalidConfig(_) => ErrorKind::Input,
            Self::RegistryUnavailable { .. }
            | Self::VersionStreamUnavailable { .. }
            | Self::RepositoryUnavailable { .. }
            | Self::Git(_)
            | Self::Host { .. }
            | Self::Io(_) => ErrorKind::Infrastructure,
            Self::PushRejected { .. } | Self::PromotionRejected { .. } => ErrorKind::Conflict,
            Self::PromotionTimeout { .. } => ErrorKind::Timeout,
            Self::UnsupportedLayout { .. } | Self::MalformedDeclaration { .. } | Self::Yaml(_) => {
                ErrorKind::Unsupported
            }
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether re-running the whole invocation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub(crate) fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }
}

/// A specialized Result type for promotion operations.
pub type Result<T> = std::result::Result<T, PromoteError>;
