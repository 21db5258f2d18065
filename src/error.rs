//! Error types for the deployment orchestration core.
//!
//! Two layers are kept apart. [`ClientError`] is what the remote platform client raises and is
//! what retry policies classify. [`DeployError`] is the single error type surfaced to callers of
//! any orchestrated operation; terminal remote failures are wrapped into it with the original
//! cause preserved.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How a remote failure is handled by the retrying request layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// May succeed if retried after a wait
    Transient,
    /// Credentials were rejected; eligible for a single re-login
    Authentication,
    /// Retrying will not help
    Terminal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::Authentication => write!(f, "authentication"),
            ErrorCategory::Terminal => write!(f, "terminal"),
        }
    }
}

/// Failures raised by the remote platform client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Staging not finished for application {app}")]
    StagingNotFinished { app: String },
    #[error("Application {app} is in stopped state")]
    AppInStoppedState { app: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Upload payload error: {0}")]
    Upload(String),
    #[error("Remote error {status}: {message}")]
    Remote { status: u16, message: String },
}

impl ClientError {
    /// Classify this failure for the retry layer
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Connection(_)
            | ClientError::StagingNotFinished { .. }
            | ClientError::AppInStoppedState { .. } => ErrorCategory::Transient,
            ClientError::Unauthorized(_) | ClientError::Forbidden(_) => {
                ErrorCategory::Authentication
            }
            ClientError::NotFound(_) | ClientError::Upload(_) => ErrorCategory::Terminal,
            // 5xx responses from the controller are worth another attempt
            ClientError::Remote { status, .. } if *status >= 500 => ErrorCategory::Transient,
            ClientError::Remote { .. } => ErrorCategory::Terminal,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        self.category() == ErrorCategory::Authentication
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, ClientError::Connection(_))
    }

    pub fn is_staging(&self) -> bool {
        matches!(self, ClientError::StagingNotFinished { .. })
    }
}

/// The uniform error type raised by every orchestrated operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeployError {
    /// A remote call failed terminally or exhausted its retry budget
    #[error("{request} failed: {source}")]
    Remote {
        request: String,
        #[source]
        source: ClientError,
    },

    #[error("Timed out after {elapsed:?} waiting for {operation}")]
    Timeout { operation: String, elapsed: Duration },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No application module is mapped to {0}")]
    ModuleNotFound(String),

    #[error("No deployable archive was produced for {0}")]
    NoArchive(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Framework error: {0}")]
    Framework(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    pub fn remote(request: impl Into<String>, source: ClientError) -> Self {
        DeployError::Remote {
            request: request.into(),
            source,
        }
    }

    /// The remote cause, if this error wraps one
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            DeployError::Remote { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Cancellations are expected outcomes and are never recorded as sticky errors
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DeployError::Cancelled(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DeployError::Timeout { .. })
    }
}

impl From<config::ConfigError> for DeployError {
    fn from(error: config::ConfigError) -> Self {
        DeployError::Configuration(error.to_string())
    }
}

impl From<std::io::Error> for DeployError {
    fn from(error: std::io::Error) -> Self {
        DeployError::Framework(format!("I/O error: {error}"))
    }
}

pub type DeployResult<T> = std::result::Result<T, DeployError>;
