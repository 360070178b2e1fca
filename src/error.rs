use std::path::PathBuf;

use thiserror::Error;

/// Every distinguishable failure kind a public operation can raise.
#[derive(Error, Debug)]
pub enum WhisperError {
    #[error("invalid archive configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("invalid time interval: {message}")]
    InvalidTimeInterval { message: String },

    #[error("timestamp {timestamp} is not covered by retention (now={now}, max_retention={max_retention})")]
    TimestampNotCovered {
        timestamp: u64,
        now: u64,
        max_retention: u64,
    },

    #[error("unknown aggregation method discriminant: {value}")]
    InvalidAggregationMethod { value: u64 },

    #[error("corrupt whisper file {path:?}: {message}")]
    CorruptWhisperFile {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WhisperError {
    pub fn corrupt<P: Into<PathBuf>>(path: P, message: impl Into<String>) -> WhisperError {
        WhisperError::CorruptWhisperFile {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> WhisperError {
        WhisperError::InvalidConfiguration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WhisperError>;
