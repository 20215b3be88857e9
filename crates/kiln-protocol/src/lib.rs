//! Framed wire protocols for the kiln network services.
//!
//! Two independent protocols share one frame format: a fixed
//! little-endian header `{id: u32, size: u32}` followed by `size` bytes
//! of bincode-encoded body.
//!
//! - The *sourced* protocol serves source-side data: path lookup, change
//!   log reads, transitive hashes, dependencies and blobs.
//! - The *compiled* protocol serves built artifacts: open a compiled
//!   stream by uuid and platform, receive change notifications.
//!
//! Any malformed frame is fatal to its connection; peers drop the socket
//! and the client side reconnects with backoff. There is no in-band
//! resynchronization.

pub mod compiled;
pub mod error;
pub mod frame;
pub mod sourced;

pub use compiled::CompiledMessage;
pub use error::{ProtocolError, ProtocolResult, Status};
pub use frame::{Frame, MAX_FRAME_SIZE, PROTOCOL_VERSION};
pub use sourced::SourcedMessage;
