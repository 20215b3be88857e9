//! Content-addressed blob payloads.
//!
//! Large binary values do not live in the change log; the log stores a
//! `{checksum, size}` descriptor and the payload lands in a sibling file
//! whose name encodes (uuid, key, platform, checksum). Reads re-hash the
//! payload and treat a mismatch as "not found", so a truncated or
//! overwritten blob self-heals through reimport instead of failing hard.

use tracing::{debug, warn};

use kiln_platform::Platform;
use kiln_types::{BlobRef, ContentHash, KeyHash, ResourceId};

use crate::error::StoreResult;
use crate::paths;
use crate::store::{write_atomic, LocalStore};

/// The 64-bit checksum of a blob payload, as stored in descriptors and
/// filenames.
pub fn blob_checksum(data: &[u8]) -> u64 {
    ContentHash::of(data).truncate()
}

impl LocalStore {
    /// Write a blob payload, truncating any previous file at the same
    /// address. Returns the descriptor to record in the change log.
    pub fn write_blob(
        &self,
        uuid: ResourceId,
        key: KeyHash,
        platform: Platform,
        data: &[u8],
    ) -> StoreResult<BlobRef> {
        let checksum = blob_checksum(data);
        let path = paths::blob(self.base(), uuid, key, platform, checksum);
        write_atomic(&path, data)?;
        debug!(%uuid, key = %key, checksum, size = data.len(), "blob written");
        Ok(BlobRef::new(checksum, data.len() as u64))
    }

    /// Read a blob payload, verifying the checksum. A missing file, a
    /// size mismatch against the descriptor, or a checksum mismatch all
    /// come back as `None`.
    pub fn read_blob(
        &self,
        uuid: ResourceId,
        key: KeyHash,
        platform: Platform,
        blob: BlobRef,
    ) -> StoreResult<Option<Vec<u8>>> {
        if let Some(remote) = self.connected_remote() {
            if let Some(data) = remote.read_blob(uuid, key, platform, blob.checksum) {
                return Ok(Some(data));
            }
        }

        let path = paths::blob(self.base(), uuid, key, platform, blob.checksum);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if data.len() as u64 != blob.size || blob_checksum(&data) != blob.checksum {
            warn!(%uuid, key = %key, checksum = blob.checksum, "blob checksum mismatch");
            return Ok(None);
        }
        Ok(Some(data))
    }

    /// Read a blob payload knowing only its checksum, as on the wire
    /// where no size accompanies the request. Verification is by
    /// checksum alone.
    pub fn read_blob_by_checksum(
        &self,
        uuid: ResourceId,
        key: KeyHash,
        platform: Platform,
        checksum: u64,
    ) -> StoreResult<Option<Vec<u8>>> {
        let path = paths::blob(self.base(), uuid, key, platform, checksum);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if blob_checksum(&data) != checksum {
            warn!(%uuid, key = %key, checksum, "blob checksum mismatch");
            return Ok(None);
        }
        Ok(Some(data))
    }

    /// Delete every blob file no record in the change history references,
    /// across all timestamps. The history itself is untouched; pruning
    /// superseded blobs requires an explicit collapse first. Returns the
    /// number of blob files deleted.
    pub fn clear_blob_history(&self, uuid: ResourceId) -> StoreResult<usize> {
        let lock = self.resource_lock(uuid);
        let _guard = lock.lock().expect("resource lock poisoned");

        let Some(log) = self.read_local_source(uuid)? else {
            return Ok(0);
        };
        let referenced = log.blob_refs();
        let shard = paths::shard_dir(self.base(), uuid);
        let mut deleted = 0;
        for entry in std::fs::read_dir(&shard)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((key, platform, checksum)) = paths::parse_blob_name(uuid, name) else {
                continue;
            };
            let live = referenced
                .iter()
                .any(|(k, p, b)| *k == key && *p == platform && b.checksum == checksum);
            if !live {
                std::fs::remove_file(entry.path())?;
                deleted += 1;
            }
        }
        debug!(%uuid, deleted, "blob history cleared");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_source::{ChangeLog, SourceFormat};
    use kiln_types::tick_now;

    fn store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn blob_roundtrip() {
        let (_dir, store) = store();
        let uuid = ResourceId::generate();
        let key = KeyHash::of("pixels");
        let data = vec![7u8; 4096];

        let blob = store
            .write_blob(uuid, key, Platform::WILDCARD, &data)
            .unwrap();
        assert_eq!(blob.size, 4096);

        let read = store
            .read_blob(uuid, key, Platform::WILDCARD, blob)
            .unwrap();
        assert_eq!(read, Some(data));
    }

    #[test]
    fn missing_blob_is_none() {
        let (_dir, store) = store();
        let read = store
            .read_blob(
                ResourceId::generate(),
                KeyHash::of("pixels"),
                Platform::WILDCARD,
                BlobRef::new(1, 1),
            )
            .unwrap();
        assert!(read.is_none());
    }

    #[test]
    fn corrupted_blob_is_none() {
        let (dir, store) = store();
        let uuid = ResourceId::generate();
        let key = KeyHash::of("pixels");
        let blob = store
            .write_blob(uuid, key, Platform::WILDCARD, b"original payload")
            .unwrap();

        // Overwrite the payload in place; the filename checksum no longer
        // matches the content.
        let path = paths::blob(dir.path(), uuid, key, Platform::WILDCARD, blob.checksum);
        std::fs::write(&path, b"corrupted payload").unwrap();

        let read = store.read_blob(uuid, key, Platform::WILDCARD, blob).unwrap();
        assert!(read.is_none());
    }

    #[test]
    fn wrong_descriptor_size_is_none() {
        let (_dir, store) = store();
        let uuid = ResourceId::generate();
        let key = KeyHash::of("pixels");
        let blob = store
            .write_blob(uuid, key, Platform::WILDCARD, b"payload")
            .unwrap();
        let wrong = BlobRef::new(blob.checksum, blob.size + 1);
        assert!(store
            .read_blob(uuid, key, Platform::WILDCARD, wrong)
            .unwrap()
            .is_none());
    }

    #[test]
    fn clear_blob_history_keeps_blobs_the_history_references() {
        let (_dir, store) = store();
        let uuid = ResourceId::generate();
        let key = KeyHash::of("pixels");

        let old = store
            .write_blob(uuid, key, Platform::WILDCARD, b"old payload")
            .unwrap();
        let new = store
            .write_blob(uuid, key, Platform::WILDCARD, b"new payload")
            .unwrap();

        let mut log = ChangeLog::new();
        let t = tick_now();
        log.set_blob(t, key, Platform::WILDCARD, old);
        log.set_blob(t + 1, key, Platform::WILDCARD, new);
        store.write_source(uuid, &log, SourceFormat::Text).unwrap();

        // Both records are still in the history, so both blobs survive
        // and the log itself is untouched.
        assert_eq!(store.clear_blob_history(uuid).unwrap(), 0);
        assert_eq!(
            store.read_blob(uuid, key, Platform::WILDCARD, old).unwrap(),
            Some(b"old payload".to_vec())
        );
        assert_eq!(store.read_source(uuid).unwrap().unwrap().len(), 2);

        // After an explicit collapse only the newest record remains and
        // the superseded blob is pruned.
        assert!(store.collapse_source(uuid).unwrap());
        assert_eq!(store.clear_blob_history(uuid).unwrap(), 1);
        assert!(store
            .read_blob(uuid, key, Platform::WILDCARD, old)
            .unwrap()
            .is_none());
        assert_eq!(
            store.read_blob(uuid, key, Platform::WILDCARD, new).unwrap(),
            Some(b"new payload".to_vec())
        );
    }

    #[test]
    fn clear_blob_history_deletes_blobs_no_record_references() {
        let (_dir, store) = store();
        let uuid = ResourceId::generate();
        let key = KeyHash::of("pixels");

        let stray = store
            .write_blob(uuid, key, Platform::WILDCARD, b"orphan payload")
            .unwrap();
        let kept = store
            .write_blob(uuid, key, Platform::WILDCARD, b"kept payload")
            .unwrap();

        let mut log = ChangeLog::new();
        log.set_blob(tick_now(), key, Platform::WILDCARD, kept);
        store.write_source(uuid, &log, SourceFormat::Text).unwrap();

        assert_eq!(store.clear_blob_history(uuid).unwrap(), 1);
        assert!(store
            .read_blob(uuid, key, Platform::WILDCARD, stray)
            .unwrap()
            .is_none());
        assert_eq!(
            store.read_blob(uuid, key, Platform::WILDCARD, kept).unwrap(),
            Some(b"kept payload".to_vec())
        );
    }

    #[test]
    fn clear_blob_history_without_source_is_zero() {
        let (_dir, store) = store();
        assert_eq!(store.clear_blob_history(ResourceId::generate()).unwrap(), 0);
    }
}
