//! Error taxonomy for storyloop.

use std::path::PathBuf;

/// Errors raised while reading or writing the backlog file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read backlog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write backlog {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backlog document is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("backlog document must be a list of stories or a mapping with a `stories` list")]
    UnexpectedShape,

    #[error("backlog could not be parsed, refusing to overwrite it: {0}")]
    Unrecoverable(String),
}

/// Errors raised while loading pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("unknown story status: {0}")]
    UnknownStatus(String),

    #[error("unknown priority: {0}")]
    UnknownPriority(String),

    #[error("unknown estimate: {0}")]
    UnknownEstimate(String),
}

/// Errors raised by run artifacts (failure reports, summaries, notes).
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Root error type for storyloop operations.
#[derive(Debug, thiserror::Error)]
pub enum StoryloopError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("report error: {0}")]
    Report(#[from] ReportError),

    #[error("handler error: {0}")]
    Handler(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storyloop operations.
pub type Result<T> = std::result::Result<T, StoryloopError>;
