//! Error types for chartsync.
//!
//! Library crates use [`ChartSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Pipeline stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Configuration loading, id parsing, client construction.
    Setup,
    /// Database query and property resolution.
    Fetch,
    /// Chart specification and URL construction.
    Render,
    /// Image upload to the image host.
    Rehost,
    /// Block listing, planning, append and delete.
    Reconcile,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Fetch => "fetch",
            Self::Render => "render",
            Self::Rehost => "rehost",
            Self::Reconcile => "reconcile",
        };
        f.write_str(name)
    }
}

/// Top-level error type for all chartsync operations.
#[derive(Debug, thiserror::Error)]
pub enum ChartSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// HTTP client construction error.
    #[error("network error: {0}")]
    Network(String),

    /// Database query or property resolution failed.
    #[error("query error ({call}): {message}")]
    Query { call: String, message: String },

    /// Chart could not be rendered from the given series.
    #[error("render error ({call}): {message}")]
    Render { call: String, message: String },

    /// Chart image could not be uploaded to the image host.
    #[error("rehost error ({call}): {message}")]
    Rehost { call: String, message: String },

    /// A document block call or reconciliation plan failed.
    #[error("reconcile error ({call}): {message}")]
    Reconcile { call: String, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad id, mismatched series, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ChartSyncError>;

impl ChartSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Database query or property resolution failure.
    pub fn query(call: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Query {
            call: call.into(),
            message: msg.into(),
        }
    }

    /// Chart rendering failure.
    pub fn render(call: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Render {
            call: call.into(),
            message: msg.into(),
        }
    }

    /// Image host failure.
    pub fn rehost(call: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Rehost {
            call: call.into(),
            message: msg.into(),
        }
    }

    /// Document block API or planning failure.
    pub fn reconcile(call: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Reconcile {
            call: call.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The pipeline stage this error aborted.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Query { .. } => Stage::Fetch,
            Self::Render { .. } => Stage::Render,
            Self::Rehost { .. } => Stage::Rehost,
            Self::Reconcile { .. } => Stage::Reconcile,
            Self::Config { .. } | Self::Network(_) | Self::Io { .. } | Self::Validation { .. } => {
                Stage::Setup
            }
        }
    }

    /// The external call that failed, if this error came from one.
    pub fn call(&self) -> Option<&str> {
        match self {
            Self::Query { call, .. }
            | Self::Render { call, .. }
            | Self::Rehost { call, .. }
            | Self::Reconcile { call, .. } => Some(call),
            _ => None,
        }
    }
}
