use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// 64-bit hash of a key name.
///
/// Change records are keyed by the hash of their key string, not the string
/// itself; the string never appears in the on-disk format. Computed as the
/// first eight bytes of the BLAKE3 hash of the name.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct KeyHash(u64);

impl KeyHash {
    /// Hash a key name.
    pub fn of(name: &str) -> Self {
        let digest = blake3::hash(name.as_bytes());
        let bytes: [u8; 8] = digest.as_bytes()[0..8].try_into().unwrap();
        Self(u64::from_le_bytes(bytes))
    }

    /// Create from a raw 64-bit value (e.g. parsed from a source file).
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// The raw 64-bit value.
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Parse from a 16-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| TypeError::InvalidHex(e.to_string()))
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHash({:016x})", self.0)
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// 256-bit BLAKE3 content hash.
///
/// Identifies the content of a serialized change log, a raw asset file, or
/// the combined digest of a resource and its transitive dependencies.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash raw bytes.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create from a pre-computed 32-byte digest.
    pub const fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// The null hash (all zeros). Represents "no hash known".
    pub const fn null() -> Self {
        Self([0u8; 32])
    }

    /// Returns `true` if this is the null hash.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Truncate to a 64-bit checksum (first eight bytes, little-endian).
    ///
    /// Blob payloads are checksummed with this narrower form so the value
    /// fits in a filename component and a fixed wire field.
    pub fn truncate(&self) -> u64 {
        u64::from_le_bytes(self.0[0..8].try_into().unwrap())
    }

    /// Hex-encoded string, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<blake3::Hash> for ContentHash {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_hash_is_deterministic() {
        assert_eq!(KeyHash::of("width"), KeyHash::of("width"));
        assert_ne!(KeyHash::of("width"), KeyHash::of("height"));
    }

    #[test]
    fn key_hash_hex_roundtrip() {
        let key = KeyHash::of("albedo");
        let parsed = KeyHash::from_hex(&key.to_string()).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = ContentHash::of(b"payload");
        let b = ContentHash::of(b"payload");
        assert_eq!(a, b);
        assert_ne!(a, ContentHash::of(b"other"));
    }

    #[test]
    fn null_hash() {
        assert!(ContentHash::null().is_null());
        assert!(!ContentHash::of(b"x").is_null());
    }

    #[test]
    fn hex_roundtrip() {
        let hash = ContentHash::of(b"roundtrip");
        let parsed = ContentHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = ContentHash::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn truncate_matches_prefix() {
        let hash = ContentHash::of(b"truncate me");
        let prefix = u64::from_le_bytes(hash.as_bytes()[0..8].try_into().unwrap());
        assert_eq!(hash.truncate(), prefix);
    }

    #[test]
    fn serde_roundtrip() {
        let hash = ContentHash::of(b"serde");
        let json = serde_json::to_string(&hash).unwrap();
        let parsed: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, parsed);
    }
}
