use serde::{Deserialize, Serialize};

/// Errors from framing and message codec.
///
/// Every variant except `Io` means the stream can no longer be trusted;
/// the connection is torn down rather than resynchronized.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Frame body larger than the protocol allows. Either a hostile peer
    /// or a desynchronized stream.
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: u32, max: u32 },

    /// Frame id not assigned by either protocol.
    #[error("unknown message id {0}")]
    UnknownMessage(u32),

    /// Frame id is valid but its body did not decode to that message.
    #[error("malformed body for message id {0}")]
    MalformedBody(u32),
}

/// Result alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Result code carried in reply messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Failed,
    /// The peer recognizes the message id but does not serve it.
    Unsupported,
}

impl Status {
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}
