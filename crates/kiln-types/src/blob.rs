use serde::{Deserialize, Serialize};

/// Descriptor for a binary payload stored outside the change log.
///
/// The change log records only this descriptor; the bytes themselves live
/// in the blob store, addressed by (resource, key, platform, checksum).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobRef {
    /// 64-bit checksum of the payload, verified on every read.
    pub checksum: u64,
    /// Payload size in bytes.
    pub size: u64,
}

impl BlobRef {
    pub fn new(checksum: u64, size: u64) -> Self {
        Self { checksum, size }
    }
}
