//! The compiled service protocol.
//!
//! Serves built artifacts: a client opens a compiled stream for a
//! (uuid, platform) pair and the raw stream bytes follow the result frame
//! on the same connection. Notifications are pushed unsolicited whenever
//! a resource is created, modified, gains a dependency edge, or is
//! deleted, carrying a token the client echoes to detect stale state.

use serde::{de::DeserializeOwned, Serialize};

use kiln_platform::Platform;
use kiln_types::ResourceId;

use crate::error::{ProtocolError, ProtocolResult, Status};
use crate::frame::Frame;

mod id {
    pub const OPEN_STATIC: u32 = 0;
    pub const OPEN_STATIC_RESULT: u32 = 1;
    pub const OPEN_DYNAMIC: u32 = 2;
    pub const OPEN_DYNAMIC_RESULT: u32 = 3;
    pub const NOTIFY_CREATE: u32 = 4;
    pub const NOTIFY_MODIFY: u32 = 5;
    pub const NOTIFY_DEPENDS: u32 = 6;
    pub const NOTIFY_DELETE: u32 = 7;
}

/// All messages of the compiled protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompiledMessage {
    /// Open the immutable part of a compiled resource stream.
    OpenStatic { uuid: ResourceId, platform: Platform },
    /// `stream_size` bytes of raw stream data follow this frame.
    OpenStaticResult { status: Status, stream_size: u64 },
    /// Open the mutable part of a compiled resource stream.
    OpenDynamic { uuid: ResourceId, platform: Platform },
    OpenDynamicResult { status: Status, stream_size: u64 },
    NotifyCreate { uuid: ResourceId, token: u64 },
    NotifyModify { uuid: ResourceId, token: u64 },
    NotifyDepends { uuid: ResourceId, token: u64 },
    NotifyDelete { uuid: ResourceId, token: u64 },
}

fn body<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn parse<T: DeserializeOwned>(id: u32, body: &[u8]) -> ProtocolResult<T> {
    bincode::deserialize(body).map_err(|_| ProtocolError::MalformedBody(id))
}

impl CompiledMessage {
    pub fn id(&self) -> u32 {
        match self {
            Self::OpenStatic { .. } => id::OPEN_STATIC,
            Self::OpenStaticResult { .. } => id::OPEN_STATIC_RESULT,
            Self::OpenDynamic { .. } => id::OPEN_DYNAMIC,
            Self::OpenDynamicResult { .. } => id::OPEN_DYNAMIC_RESULT,
            Self::NotifyCreate { .. } => id::NOTIFY_CREATE,
            Self::NotifyModify { .. } => id::NOTIFY_MODIFY,
            Self::NotifyDepends { .. } => id::NOTIFY_DEPENDS,
            Self::NotifyDelete { .. } => id::NOTIFY_DELETE,
        }
    }

    pub fn encode(&self) -> ProtocolResult<Frame> {
        let payload = match self {
            Self::OpenStatic { uuid, platform } | Self::OpenDynamic { uuid, platform } => {
                body(&(uuid, platform))?
            }
            Self::OpenStaticResult {
                status,
                stream_size,
            }
            | Self::OpenDynamicResult {
                status,
                stream_size,
            } => body(&(status, stream_size))?,
            Self::NotifyCreate { uuid, token }
            | Self::NotifyModify { uuid, token }
            | Self::NotifyDepends { uuid, token }
            | Self::NotifyDelete { uuid, token } => body(&(uuid, token))?,
        };
        Ok(Frame::new(self.id(), payload))
    }

    pub fn decode(frame: &Frame) -> ProtocolResult<Self> {
        let id = frame.id;
        let b = frame.body.as_slice();
        let message = match id {
            id::OPEN_STATIC => {
                let (uuid, platform) = parse(id, b)?;
                Self::OpenStatic { uuid, platform }
            }
            id::OPEN_STATIC_RESULT => {
                let (status, stream_size) = parse(id, b)?;
                Self::OpenStaticResult {
                    status,
                    stream_size,
                }
            }
            id::OPEN_DYNAMIC => {
                let (uuid, platform) = parse(id, b)?;
                Self::OpenDynamic { uuid, platform }
            }
            id::OPEN_DYNAMIC_RESULT => {
                let (status, stream_size) = parse(id, b)?;
                Self::OpenDynamicResult {
                    status,
                    stream_size,
                }
            }
            id::NOTIFY_CREATE => {
                let (uuid, token) = parse(id, b)?;
                Self::NotifyCreate { uuid, token }
            }
            id::NOTIFY_MODIFY => {
                let (uuid, token) = parse(id, b)?;
                Self::NotifyModify { uuid, token }
            }
            id::NOTIFY_DEPENDS => {
                let (uuid, token) = parse(id, b)?;
                Self::NotifyDepends { uuid, token }
            }
            id::NOTIFY_DELETE => {
                let (uuid, token) = parse(id, b)?;
                Self::NotifyDelete { uuid, token }
            }
            other => return Err(ProtocolError::UnknownMessage(other)),
        };
        Ok(message)
    }
}
