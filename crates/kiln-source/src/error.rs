use thiserror::Error;

/// Errors from change log serialization.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A record line or field could not be parsed.
    #[error("malformed source record at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    /// The serialized form ended mid-record.
    #[error("truncated source data at offset {offset}")]
    Truncated { offset: usize },

    /// I/O error reading or writing a source stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for source operations.
pub type SourceResult<T> = Result<T, SourceError>;
