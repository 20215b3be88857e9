use kiln_platform::Platform;
use kiln_source::ChangeLog;
use kiln_types::{ContentHash, KeyHash, ResourceId, Signature};

/// A remote sourced service the store consults before local data.
///
/// Implemented by the network client crate; the store only sees this seam
/// so it can be exercised in tests with an in-process fake. Every method
/// is best-effort: `None` means "remote had no answer", and the store
/// falls back to local files.
pub trait RemoteSource: Send + Sync {
    /// Whether the backing connection is currently established. When this
    /// is `false` the store skips the remote entirely.
    fn is_connected(&self) -> bool;

    /// Resolve a source file path to a resource signature.
    fn lookup(&self, path: &str) -> Option<Signature>;

    /// Fetch the full change log of a resource.
    fn read(&self, uuid: ResourceId) -> Option<ChangeLog>;

    /// Fetch the transitive content hash of a resource.
    fn hash(&self, uuid: ResourceId, platform: Platform) -> Option<ContentHash>;

    /// Fetch the forward dependency list of a resource.
    fn dependencies(&self, uuid: ResourceId, platform: Platform) -> Option<Vec<ResourceId>>;

    /// Fetch a blob payload.
    fn read_blob(
        &self,
        uuid: ResourceId,
        key: KeyHash,
        platform: Platform,
        checksum: u64,
    ) -> Option<Vec<u8>>;
}
