use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use kiln_source::{ChangeLog, SourceFormat};
use kiln_types::{ContentHash, ResourceId};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::paths;
use crate::remote::RemoteSource;

/// Handle to a local on-disk resource store.
///
/// Holds no open files; every operation resolves its paths from the base
/// directory. Read-modify-write operations on one resource take that
/// resource's lock from an internal table, so concurrent callers on the
/// same store handle cannot interleave partial updates. Separate handles
/// on the same directory fall back to last-writer-wins whole-file
/// replacement.
pub struct LocalStore {
    base: PathBuf,
    remote: Option<Arc<dyn RemoteSource>>,
    locks: Mutex<HashMap<ResourceId, Arc<Mutex<()>>>>,
}

impl LocalStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            remote: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.path.clone())
    }

    /// Attach a remote sourced service consulted before local files.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteSource>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The attached remote, if any and currently connected.
    pub(crate) fn connected_remote(&self) -> Option<&dyn RemoteSource> {
        match &self.remote {
            Some(remote) if remote.is_connected() => Some(remote.as_ref()),
            _ => None,
        }
    }

    /// The per-resource lock guarding read-modify-write file updates.
    pub(crate) fn resource_lock(&self, uuid: ResourceId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        locks.entry(uuid).or_default().clone()
    }

    /// Read a resource's change log, consulting the remote first.
    pub fn read_source(&self, uuid: ResourceId) -> StoreResult<Option<ChangeLog>> {
        if let Some(remote) = self.connected_remote() {
            if let Some(log) = remote.read(uuid) {
                debug!(%uuid, changes = log.len(), "source read from remote");
                return Ok(Some(log));
            }
        }
        self.read_local_source(uuid)
    }

    /// Read a resource's change log from local files only.
    pub fn read_local_source(&self, uuid: ResourceId) -> StoreResult<Option<ChangeLog>> {
        let path = paths::source(&self.base, uuid);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let log = kiln_source::deserialize(&data)
            .map_err(|source| StoreError::CorruptSource { uuid, source })?;
        Ok(Some(log))
    }

    /// Persist a resource's change log, replacing any previous file, and
    /// record the content hash of the serialized bytes in the `.hash`
    /// sibling. Returns that hash.
    pub fn write_source(
        &self,
        uuid: ResourceId,
        log: &ChangeLog,
        format: SourceFormat,
    ) -> StoreResult<ContentHash> {
        let lock = self.resource_lock(uuid);
        let _guard = lock.lock().expect("resource lock poisoned");
        self.persist_source(uuid, log, format)
    }

    /// Compact a resource's stored history to the newest record per
    /// (key, platform) pair, rewriting the file in the format it was read
    /// in. Returns `false` if the resource has no local source.
    pub fn collapse_source(&self, uuid: ResourceId) -> StoreResult<bool> {
        let lock = self.resource_lock(uuid);
        let _guard = lock.lock().expect("resource lock poisoned");

        let Some(mut log) = self.read_local_source(uuid)? else {
            return Ok(false);
        };
        let before = log.len();
        log.collapse_history();
        let format = if log.read_binary() {
            SourceFormat::Binary
        } else {
            SourceFormat::Text
        };
        self.persist_source(uuid, &log, format)?;
        debug!(%uuid, before, after = log.len(), "source history collapsed");
        Ok(true)
    }

    /// Serialize and write the log plus its `.hash` sibling. Caller holds
    /// the resource lock.
    pub(crate) fn persist_source(
        &self,
        uuid: ResourceId,
        log: &ChangeLog,
        format: SourceFormat,
    ) -> StoreResult<ContentHash> {
        let serialized = kiln_source::serialize(log, format);
        let hash = kiln_source::content_hash(&serialized);
        write_atomic(&paths::source(&self.base, uuid), &serialized)?;
        write_atomic(
            &paths::source_hash(&self.base, uuid),
            hash.to_hex().as_bytes(),
        )?;
        debug!(%uuid, changes = log.len(), bytes = serialized.len(), "source written");
        Ok(hash)
    }

    /// The stored content hash of a resource's own serialized source, from
    /// the `.hash` sibling file. An unreadable or malformed file counts as
    /// "no hash known".
    pub fn source_hash(&self, uuid: ResourceId) -> StoreResult<Option<ContentHash>> {
        read_hash_file(&paths::source_hash(&self.base, uuid))
    }

    /// Record the input hash of the last import of this resource.
    pub fn set_import_hash(&self, uuid: ResourceId, hash: ContentHash) -> StoreResult<()> {
        write_atomic(
            &paths::import_hash(&self.base, uuid),
            hash.to_hex().as_bytes(),
        )
    }

    /// The input hash of the last import, if recorded.
    pub fn import_hash(&self, uuid: ResourceId) -> StoreResult<Option<ContentHash>> {
        read_hash_file(&paths::import_hash(&self.base, uuid))
    }
}

fn read_hash_file(path: &Path) -> StoreResult<Option<ContentHash>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match ContentHash::from_hex(text.trim()) {
        Ok(hash) => Ok(Some(hash)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed hash file ignored");
            Ok(None)
        }
    }
}

/// Write a file via temp-then-rename so readers never observe a partial
/// file, creating parent directories as needed.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    std::fs::create_dir_all(parent)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(data)?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
