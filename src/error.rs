use std::time::Duration;

use thiserror::Error;

/// Startup failures. None of these are recoverable per frame.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid frame rate {0}; fps must be positive")]
    InvalidFrameRate(f64),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("registry file {path} is unavailable: {source}")]
    Registry {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("column `{column}` not found in {path}")]
    MissingColumn { path: String, column: String },
}

/// Failure of an external capability (detector, tracker, helmet, OCR).
/// The pipeline always recovers from these with a safe default.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability call exceeded {0:?}")]
    Timeout(Duration),
    #[error("http status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("image error: {0}")]
    Image(#[from] opencv::Error),
    #[error("{0}")]
    Backend(String),
}

impl From<ureq::Error> for CapabilityError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => CapabilityError::Status(code),
            ureq::Error::Transport(transport) => CapabilityError::Transport(transport.to_string()),
        }
    }
}

/// Persistence failure. Never swallowed: a dropped write loses a violation.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("violation store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("column `{0}` not found")]
    MissingColumn(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("frame error: {0}")]
    Frame(#[from] opencv::Error),
}
