//! Error types for ReadingPal.
//!
//! Library crates use [`ReadingPalError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ReadingPal operations.
#[derive(Debug, thiserror::Error)]
pub enum ReadingPalError {
    /// Application config loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A project's resolved pipeline configuration failed cross-field validation.
    #[error("configuration invalid: {message}")]
    ConfigurationInvalid { message: String },

    /// A handler needed the project's configuration but no row exists.
    #[error("project {project_id} has no pipeline configuration")]
    ConfigurationMissing { project_id: String },

    /// The configured downloader has no dispatchable work-unit.
    #[error("unsupported downloader '{downloader}' (supported: {})", .supported.join(", "))]
    UnsupportedDownloader {
        downloader: String,
        supported: Vec<String>,
    },

    /// The configured text extractor provider has no dispatchable work-unit.
    #[error("unsupported text extractor '{provider}' (supported providers: {})", .supported.join(", "))]
    UnsupportedTextExtractor {
        provider: String,
        supported: Vec<String>,
    },

    /// The processor's chunker has no dispatchable work-unit.
    #[error("unsupported chunker '{chunker}' (supported: {})", .supported.join(", "))]
    UnsupportedChunker {
        chunker: String,
        supported: Vec<String>,
    },

    /// The planner was handed an event it does not build pipelines for.
    #[error("unknown pipeline event: {0}")]
    UnknownEvent(String),

    /// A planning-time structural assumption was violated.
    #[error("pipeline plan invariant violated: {0}")]
    PlanInvariant(String),

    /// A resource lookup found no row.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// A project lookup found no row.
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// A resource status change that the lifecycle does not allow.
    #[error("invalid resource transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Non-success response from the reader/extraction API.
    #[error("Error code from reader API: {status}\nError message: {body}")]
    ExternalService { status: u16, body: String },

    /// Network/HTTP transport error.
    #[error("network error: {0}")]
    Network(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Job runtime error (submission, registration, queue).
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (bad URL, malformed value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ReadingPalError>;

impl ReadingPalError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a configuration-invalid error from any displayable message.
    pub fn configuration_invalid(msg: impl Into<String>) -> Self {
        Self::ConfigurationInvalid {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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

    /// Planning-time errors are fatal and never retried.
    pub fn is_planning_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationInvalid { .. }
                | Self::UnsupportedDownloader { .. }
                | Self::UnsupportedTextExtractor { .. }
                | Self::UnsupportedChunker { .. }
                | Self::UnknownEvent(_)
                | Self::PlanInvariant(_)
        )
    }
}
