//! The sourced service protocol.
//!
//! Message ids are wire-stable; new messages append, existing ids never
//! renumber. Request/result pairs occupy adjacent ids. The server may
//! answer any request it does not serve with its paired result carrying
//! [`Status::Unsupported`].

use serde::{de::DeserializeOwned, Serialize};

use kiln_platform::Platform;
use kiln_source::Change;
use kiln_store::Dependency;
use kiln_types::{ContentHash, KeyHash, ResourceId, Signature};

use crate::error::{ProtocolError, ProtocolResult, Status};
use crate::frame::Frame;

mod id {
    pub const LOOKUP: u32 = 1;
    pub const LOOKUP_RESULT: u32 = 2;
    pub const REVERSE_LOOKUP: u32 = 3;
    pub const REVERSE_LOOKUP_RESULT: u32 = 4;
    pub const IMPORT: u32 = 5;
    pub const IMPORT_RESULT: u32 = 6;
    pub const GET: u32 = 7;
    pub const GET_RESULT: u32 = 8;
    pub const READ: u32 = 9;
    pub const READ_RESULT: u32 = 10;
    pub const SET: u32 = 11;
    pub const SET_RESULT: u32 = 12;
    pub const UNSET: u32 = 13;
    pub const UNSET_RESULT: u32 = 14;
    pub const DELETE: u32 = 15;
    pub const DELETE_RESULT: u32 = 16;
    pub const HASH: u32 = 17;
    pub const HASH_RESULT: u32 = 18;
    pub const DEPENDENCIES: u32 = 19;
    pub const DEPENDENCIES_RESULT: u32 = 20;
    pub const READ_BLOB: u32 = 21;
    pub const READ_BLOB_RESULT: u32 = 22;
    pub const NOTIFY_CREATE: u32 = 23;
    pub const NOTIFY_MODIFY: u32 = 24;
    pub const NOTIFY_DELETE: u32 = 25;
}

/// All messages of the sourced protocol, requests and results both.
#[derive(Clone, Debug, PartialEq)]
pub enum SourcedMessage {
    Lookup {
        path: String,
    },
    LookupResult {
        status: Status,
        signature: Signature,
    },
    ReverseLookup {
        uuid: ResourceId,
    },
    ReverseLookupResult {
        status: Status,
        path: String,
    },
    Import {
        path: String,
    },
    ImportResult {
        status: Status,
        uuid: ResourceId,
    },
    Get {
        uuid: ResourceId,
        key: KeyHash,
        platform: Platform,
    },
    GetResult {
        status: Status,
        value: String,
    },
    Read {
        uuid: ResourceId,
    },
    ReadResult {
        status: Status,
        changes: Vec<Change>,
    },
    Set {
        uuid: ResourceId,
        key: KeyHash,
        platform: Platform,
        value: String,
    },
    SetResult {
        status: Status,
    },
    Unset {
        uuid: ResourceId,
        key: KeyHash,
        platform: Platform,
    },
    UnsetResult {
        status: Status,
    },
    Delete {
        uuid: ResourceId,
    },
    DeleteResult {
        status: Status,
    },
    Hash {
        uuid: ResourceId,
        platform: Platform,
    },
    HashResult {
        status: Status,
        hash: ContentHash,
    },
    Dependencies {
        uuid: ResourceId,
        platform: Platform,
    },
    DependenciesResult {
        status: Status,
        deps: Vec<Dependency>,
    },
    ReadBlob {
        uuid: ResourceId,
        key: KeyHash,
        platform: Platform,
        checksum: u64,
    },
    ReadBlobResult {
        status: Status,
        data: Vec<u8>,
    },
    NotifyCreate {
        uuid: ResourceId,
        token: u64,
    },
    NotifyModify {
        uuid: ResourceId,
        token: u64,
    },
    NotifyDelete {
        uuid: ResourceId,
        token: u64,
    },
}

fn body<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn parse<T: DeserializeOwned>(id: u32, body: &[u8]) -> ProtocolResult<T> {
    bincode::deserialize(body).map_err(|_| ProtocolError::MalformedBody(id))
}

impl SourcedMessage {
    /// The wire id of this message.
    pub fn id(&self) -> u32 {
        match self {
            Self::Lookup { .. } => id::LOOKUP,
            Self::LookupResult { .. } => id::LOOKUP_RESULT,
            Self::ReverseLookup { .. } => id::REVERSE_LOOKUP,
            Self::ReverseLookupResult { .. } => id::REVERSE_LOOKUP_RESULT,
            Self::Import { .. } => id::IMPORT,
            Self::ImportResult { .. } => id::IMPORT_RESULT,
            Self::Get { .. } => id::GET,
            Self::GetResult { .. } => id::GET_RESULT,
            Self::Read { .. } => id::READ,
            Self::ReadResult { .. } => id::READ_RESULT,
            Self::Set { .. } => id::SET,
            Self::SetResult { .. } => id::SET_RESULT,
            Self::Unset { .. } => id::UNSET,
            Self::UnsetResult { .. } => id::UNSET_RESULT,
            Self::Delete { .. } => id::DELETE,
            Self::DeleteResult { .. } => id::DELETE_RESULT,
            Self::Hash { .. } => id::HASH,
            Self::HashResult { .. } => id::HASH_RESULT,
            Self::Dependencies { .. } => id::DEPENDENCIES,
            Self::DependenciesResult { .. } => id::DEPENDENCIES_RESULT,
            Self::ReadBlob { .. } => id::READ_BLOB,
            Self::ReadBlobResult { .. } => id::READ_BLOB_RESULT,
            Self::NotifyCreate { .. } => id::NOTIFY_CREATE,
            Self::NotifyModify { .. } => id::NOTIFY_MODIFY,
            Self::NotifyDelete { .. } => id::NOTIFY_DELETE,
        }
    }

    /// The result message declining this request, if it is a request.
    pub fn unsupported_reply(&self) -> Option<SourcedMessage> {
        let status = Status::Unsupported;
        match self {
            Self::Lookup { .. } => Some(Self::LookupResult {
                status,
                signature: Signature::null(),
            }),
            Self::ReverseLookup { .. } => Some(Self::ReverseLookupResult {
                status,
                path: String::new(),
            }),
            Self::Import { .. } => Some(Self::ImportResult {
                status,
                uuid: ResourceId::null(),
            }),
            Self::Get { .. } => Some(Self::GetResult {
                status,
                value: String::new(),
            }),
            Self::Read { .. } => Some(Self::ReadResult {
                status,
                changes: Vec::new(),
            }),
            Self::Set { .. } => Some(Self::SetResult { status }),
            Self::Unset { .. } => Some(Self::UnsetResult { status }),
            Self::Delete { .. } => Some(Self::DeleteResult { status }),
            Self::Hash { .. } => Some(Self::HashResult {
                status,
                hash: ContentHash::null(),
            }),
            Self::Dependencies { .. } => Some(Self::DependenciesResult {
                status,
                deps: Vec::new(),
            }),
            Self::ReadBlob { .. } => Some(Self::ReadBlobResult {
                status,
                data: Vec::new(),
            }),
            _ => None,
        }
    }

    /// Encode into a frame.
    pub fn encode(&self) -> ProtocolResult<Frame> {
        let payload = match self {
            Self::Lookup { path } => body(path)?,
            Self::LookupResult { status, signature } => body(&(status, signature))?,
            Self::ReverseLookup { uuid } => body(uuid)?,
            Self::ReverseLookupResult { status, path } => body(&(status, path))?,
            Self::Import { path } => body(path)?,
            Self::ImportResult { status, uuid } => body(&(status, uuid))?,
            Self::Get {
                uuid,
                key,
                platform,
            } => body(&(uuid, key, platform))?,
            Self::GetResult { status, value } => body(&(status, value))?,
            Self::Read { uuid } => body(uuid)?,
            Self::ReadResult { status, changes } => body(&(status, changes))?,
            Self::Set {
                uuid,
                key,
                platform,
                value,
            } => body(&(uuid, key, platform, value))?,
            Self::SetResult { status } => body(status)?,
            Self::Unset {
                uuid,
                key,
                platform,
            } => body(&(uuid, key, platform))?,
            Self::UnsetResult { status } => body(status)?,
            Self::Delete { uuid } => body(uuid)?,
            Self::DeleteResult { status } => body(status)?,
            Self::Hash { uuid, platform } => body(&(uuid, platform))?,
            Self::HashResult { status, hash } => body(&(status, hash))?,
            Self::Dependencies { uuid, platform } => body(&(uuid, platform))?,
            Self::DependenciesResult { status, deps } => body(&(status, deps))?,
            Self::ReadBlob {
                uuid,
                key,
                platform,
                checksum,
            } => body(&(uuid, key, platform, checksum))?,
            Self::ReadBlobResult { status, data } => body(&(status, data))?,
            Self::NotifyCreate { uuid, token }
            | Self::NotifyModify { uuid, token }
            | Self::NotifyDelete { uuid, token } => body(&(uuid, token))?,
        };
        Ok(Frame::new(self.id(), payload))
    }

    /// Decode from a frame.
    pub fn decode(frame: &Frame) -> ProtocolResult<Self> {
        let id = frame.id;
        let b = frame.body.as_slice();
        let message = match id {
            id::LOOKUP => Self::Lookup {
                path: parse(id, b)?,
            },
            id::LOOKUP_RESULT => {
                let (status, signature) = parse(id, b)?;
                Self::LookupResult { status, signature }
            }
            id::REVERSE_LOOKUP => Self::ReverseLookup {
                uuid: parse(id, b)?,
            },
            id::REVERSE_LOOKUP_RESULT => {
                let (status, path) = parse(id, b)?;
                Self::ReverseLookupResult { status, path }
            }
            id::IMPORT => Self::Import {
                path: parse(id, b)?,
            },
            id::IMPORT_RESULT => {
                let (status, uuid) = parse(id, b)?;
                Self::ImportResult { status, uuid }
            }
            id::GET => {
                let (uuid, key, platform) = parse(id, b)?;
                Self::Get {
                    uuid,
                    key,
                    platform,
                }
            }
            id::GET_RESULT => {
                let (status, value) = parse(id, b)?;
                Self::GetResult { status, value }
            }
            id::READ => Self::Read {
                uuid: parse(id, b)?,
            },
            id::READ_RESULT => {
                let (status, changes) = parse(id, b)?;
                Self::ReadResult { status, changes }
            }
            id::SET => {
                let (uuid, key, platform, value) = parse(id, b)?;
                Self::Set {
                    uuid,
                    key,
                    platform,
                    value,
                }
            }
            id::SET_RESULT => Self::SetResult {
                status: parse(id, b)?,
            },
            id::UNSET => {
                let (uuid, key, platform) = parse(id, b)?;
                Self::Unset {
                    uuid,
                    key,
                    platform,
                }
            }
            id::UNSET_RESULT => Self::UnsetResult {
                status: parse(id, b)?,
            },
            id::DELETE => Self::Delete {
                uuid: parse(id, b)?,
            },
            id::DELETE_RESULT => Self::DeleteResult {
                status: parse(id, b)?,
            },
            id::HASH => {
                let (uuid, platform) = parse(id, b)?;
                Self::Hash { uuid, platform }
            }
            id::HASH_RESULT => {
                let (status, hash) = parse(id, b)?;
                Self::HashResult { status, hash }
            }
            id::DEPENDENCIES => {
                let (uuid, platform) = parse(id, b)?;
                Self::Dependencies { uuid, platform }
            }
            id::DEPENDENCIES_RESULT => {
                let (status, deps) = parse(id, b)?;
                Self::DependenciesResult { status, deps }
            }
            id::READ_BLOB => {
                let (uuid, key, platform, checksum) = parse(id, b)?;
                Self::ReadBlob {
                    uuid,
                    key,
                    platform,
                    checksum,
                }
            }
            id::READ_BLOB_RESULT => {
                let (status, data) = parse(id, b)?;
                Self::ReadBlobResult { status, data }
            }
            id::NOTIFY_CREATE => {
                let (uuid, token) = parse(id, b)?;
                Self::NotifyCreate { uuid, token }
            }
            id::NOTIFY_MODIFY => {
                let (uuid, token) = parse(id, b)?;
                Self::NotifyModify { uuid, token }
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
