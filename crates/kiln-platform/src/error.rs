use thiserror::Error;

/// Errors from platform specification parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("empty platform specification")]
    Empty,
}
