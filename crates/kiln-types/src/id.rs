use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;
use crate::hash::{ContentHash, KeyHash};

/// 128-bit resource identifier.
///
/// A `ResourceId` is the primary key for all resource data: the change log,
/// dependency files, blobs and compiled output are all addressed by it.
/// A resource is assigned its id on first import and keeps it for life.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Generate a fresh random resource identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The null resource id (all zeros). Represents "no resource".
    pub const fn null() -> Self {
        Self(Uuid::nil())
    }

    /// Returns `true` if this is the null resource id.
    pub fn is_null(&self) -> bool {
        self.0.is_nil()
    }

    /// The raw 16-byte value.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Create from a raw 16-byte value.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Fold the id into a 64-bit key hash (xor of the two halves).
    ///
    /// Used where a resource id must act as a key in 64-bit keyed
    /// structures, e.g. referencing another resource from a change value.
    pub fn fold_hash(&self) -> KeyHash {
        let b = self.0.as_bytes();
        let lo = u64::from_le_bytes(b[0..8].try_into().unwrap());
        let hi = u64::from_le_bytes(b[8..16].try_into().unwrap());
        KeyHash::from_raw(lo ^ hi)
    }

    /// Canonical hyphenated string form, 36 characters.
    pub fn to_canonical(&self) -> String {
        self.0.as_hyphenated().to_string()
    }

    /// Parse from a hyphenated or simple UUID string.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidUuid(e.to_string()))
    }

    /// Sharding components for on-disk layout: the first two and next two
    /// hex characters of the canonical form.
    pub fn shard(&self) -> (String, String) {
        let simple = self.0.as_simple().to_string();
        (simple[0..2].to_string(), simple[2..4].to_string())
    }
}

impl std::str::FromStr for ResourceId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0.as_hyphenated())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

impl From<Uuid> for ResourceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A resource identity paired with the content hash of its source data.
///
/// Returned by import-map lookups and remote lookups; the hash side is the
/// staleness signal ("has the raw asset changed since it was imported").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub uuid: ResourceId,
    pub hash: ContentHash,
}

impl Signature {
    pub fn new(uuid: ResourceId, hash: ContentHash) -> Self {
        Self { uuid, hash }
    }

    /// A signature with null id and null hash ("not found").
    pub fn null() -> Self {
        Self {
            uuid: ResourceId::null(),
            hash: ContentHash::null(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.uuid.is_null()
    }
}
