//! Error types for the Timeline Studio core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Notification(#[from] NotificationError),
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Input rejected before anything is sent to the backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Commit message is empty after trimming.
    #[error("commit message must not be empty")]
    EmptyMessage,

    /// Merge submitted without a source branch.
    #[error("no source branch selected")]
    NoSourceBranch,

    /// Merge submitted without a strategy.
    #[error("no merge strategy selected")]
    NoStrategy,

    /// The source branch is the merge target.
    #[error("cannot merge branch '{0}' into itself")]
    SourceIsTarget(String),

    /// The branch is not in the selectable set.
    #[error("unknown branch '{0}'")]
    UnknownBranch(String),

    /// Render was requested but the render configuration is incomplete.
    #[error("render configuration incomplete: {0}")]
    RenderConfig(String),

    /// A scene parameter is out of range.
    #[error("invalid scene parameter '{field}': {detail}")]
    SceneParam { field: String, detail: String },
}

// ---------------------------------------------------------------------------
// Backend errors
// ---------------------------------------------------------------------------

/// Errors from the studio backend and the GPU stats service.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP-level transport error (network, TLS, timeout).
    #[error("backend HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend returned a non-success status code.
    #[error("backend API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("backend response parse error: {0}")]
    Parse(String),
}

impl BackendError {
    /// Short label for notifications and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Api { .. } => "api",
            Self::Parse(_) => "parse",
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow errors
// ---------------------------------------------------------------------------

/// Dialog state-machine violations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// A transition was attempted from a phase that does not allow it.
    #[error("invalid transition from {from} via {action}")]
    InvalidTransition { from: String, action: String },

    /// Merge submitted while the branch comparison is still in flight.
    #[error("branch comparison still in progress")]
    ComparisonPending,

    /// Merge submitted while the comparison is unavailable.
    #[error("branch comparison unavailable: {0}")]
    ComparisonUnavailable(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Notification errors
// ---------------------------------------------------------------------------

/// Errors from notification delivery.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Slack webhook delivery failed.
    #[error("Slack notification failed: {0}")]
    SlackError(String),

    /// HTTP error during notification delivery.
    #[error("notification HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        assert_eq!(
            ValidationError::EmptyMessage.to_string(),
            "commit message must not be empty"
        );

        let err = ValidationError::SourceIsTarget("main".into());
        assert_eq!(err.to_string(), "cannot merge branch 'main' into itself");

        let err = BackendError::Api {
            status: 502,
            body: "bad gateway".into(),
        };
        assert!(err.to_string().contains("HTTP 502"));
        assert_eq!(err.kind(), "api");

        let err = ConfigError::InvalidValue {
            field: "backend.api_url".into(),
            detail: "must not be empty".into(),
        };
        assert!(err.to_string().contains("backend.api_url"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = ValidationError::NoSourceBranch.into();
        assert!(matches!(core_err, CoreError::Validation(_)));

        let core_err: CoreError = WorkflowError::ComparisonPending.into();
        assert!(matches!(core_err, CoreError::Workflow(_)));

        let wf: WorkflowError = ValidationError::NoStrategy.into();
        assert_eq!(wf, WorkflowError::Validation(ValidationError::NoStrategy));
    }
}
