//! Deterministic on-disk path layout.
//!
//! All per-resource files live under a two-level shard derived from the
//! first four hex characters of the UUID, keeping directory fan-out flat
//! for large stores.

use std::path::{Path, PathBuf};

use kiln_platform::Platform;
use kiln_types::{KeyHash, ResourceId};

/// The shard directory for a resource: `<base>/<aa>/<bb>`.
pub fn shard_dir(base: &Path, uuid: ResourceId) -> PathBuf {
    let (a, b) = uuid.shard();
    base.join(a).join(b)
}

/// Path of the change log file.
pub fn source(base: &Path, uuid: ResourceId) -> PathBuf {
    shard_dir(base, uuid).join(uuid.to_canonical())
}

/// Path of the content hash sibling file.
pub fn source_hash(base: &Path, uuid: ResourceId) -> PathBuf {
    shard_dir(base, uuid).join(format!("{}.hash", uuid.to_canonical()))
}

/// Path of the forward dependency file.
pub fn deps(base: &Path, uuid: ResourceId) -> PathBuf {
    shard_dir(base, uuid).join(format!("{}.deps", uuid.to_canonical()))
}

/// Path of the reverse dependency file.
pub fn revdeps(base: &Path, uuid: ResourceId) -> PathBuf {
    shard_dir(base, uuid).join(format!("{}.revdeps", uuid.to_canonical()))
}

/// Path of the import input hash file.
pub fn import_hash(base: &Path, uuid: ResourceId) -> PathBuf {
    shard_dir(base, uuid).join(format!("{}.importhash", uuid.to_canonical()))
}

/// Path of a blob payload. The filename encodes everything needed to
/// address and verify the payload.
pub fn blob(
    base: &Path,
    uuid: ResourceId,
    key: KeyHash,
    platform: Platform,
    checksum: u64,
) -> PathBuf {
    shard_dir(base, uuid).join(format!(
        "{}.{}.{:x}.{:x}.blob",
        uuid.to_canonical(),
        key,
        platform.bits(),
        checksum
    ))
}

/// Parse the (key, platform, checksum) components back out of a blob
/// filename belonging to `uuid`. Returns `None` for files that are not
/// blobs of this resource.
pub fn parse_blob_name(
    uuid: ResourceId,
    file_name: &str,
) -> Option<(KeyHash, Platform, u64)> {
    let prefix = format!("{}.", uuid.to_canonical());
    let rest = file_name.strip_prefix(&prefix)?.strip_suffix(".blob")?;
    let mut parts = rest.split('.');
    let key = KeyHash::from_hex(parts.next()?).ok()?;
    let platform = Platform::from_bits(u64::from_str_radix(parts.next()?, 16).ok()?);
    let checksum = u64::from_str_radix(parts.next()?, 16).ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((key, platform, checksum))
}
