//! Error types for the ISTVON decision pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by [`crate::IstvonEngine`]. Classification and mapping are total, so the
/// only per-request failure is an oversized prompt.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("prompt is {length} characters, the configured maximum is {max}")]
    InputTooLong { length: usize, max: usize },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Malformed policy or settings. Raised while building the engine at process start, never
/// while handling a request.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("invalid pattern `{pattern}` in {owner}: {source}")]
    InvalidPattern {
        owner: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("duplicate {kind} `{name}`")]
    Duplicate { kind: &'static str, name: String },

    #[error("{kind} `{name}` defines no patterns")]
    Empty { kind: &'static str, name: String },

    #[error("{kind} name must not be empty")]
    Unnamed { kind: &'static str },

    #[error("redaction placeholder `{placeholder}` is matched by category `{category}`")]
    PlaceholderMatches { placeholder: String, category: String },

    #[error("unknown COSTAR dimension `{0}`")]
    UnknownDimension(String),

    #[error("COSTAR dimension `{0}` has no detector")]
    MissingDimension(String),

    #[error("invalid thresholds: {0}")]
    Thresholds(String),

    #[error("failed to parse {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

/// Failure of the optional enhancement collaborator. The pipeline treats every variant as
/// "no enhancement available" and keeps the rule-based result.
#[derive(Error, Debug)]
pub enum EnhancementError {
    #[error("enhancement is not configured")]
    Unavailable,

    #[error("enhancement timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed enhancement response: {0}")]
    MalformedResponse(String),
}
