//! The `import.map` flat file.
//!
//! One map file serves a whole directory tree: lookups walk up from the
//! asset towards the root and use the first `import.map` found. Each line
//! is a fixed-width record:
//!
//! ```text
//! <path-hash 16 hex> <uuid 36> <content-hash 64 hex> <relative path>
//! ```
//!
//! Field offsets are fixed (uuid at 17, hash at 54, path at 119), so a
//! changed content hash is patched into the existing line without moving
//! any other record. The minimum valid line is 120 bytes; shorter lines
//! are ignored.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use walkdir::WalkDir;

use kiln_store::RemoteSource;
use kiln_types::{ContentHash, KeyHash, ResourceId, Signature};

use crate::error::{ImportError, ImportResult};

/// Map file name, one per directory tree.
pub const MAP_FILE_NAME: &str = "import.map";

const UUID_OFFSET: usize = 17;
const HASH_OFFSET: usize = 54;
const PATH_OFFSET: usize = 119;
const MIN_LINE: usize = 120;

/// Import-map access, optionally backed by a remote sourced service.
///
/// Stateless apart from configuration; every call re-reads the map files
/// it touches.
#[derive(Default)]
pub struct ImportMap {
    /// Base directory that remote-side paths are relative to. Lookups of
    /// absolute paths under this base strip it before asking the remote.
    base: Option<PathBuf>,
    remote: Option<Arc<dyn RemoteSource>>,
}

impl ImportMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteSource>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Record `path` in the nearest ancestor map file, creating one next
    /// to the file if the tree has none.
    ///
    /// If the path is already mapped, the stored uuid wins and a changed
    /// content hash is patched in place; otherwise a new record with
    /// `uuid` is appended. Returns the mapped uuid either way, so callers
    /// pass a freshly generated candidate and use whatever comes back.
    pub fn store(
        &self,
        path: &Path,
        uuid: ResourceId,
        hash: ContentHash,
    ) -> ImportResult<ResourceId> {
        let map_path = match find_map(path) {
            Some(found) => found,
            None => path
                .parent()
                .map(|dir| dir.join(MAP_FILE_NAME))
                .ok_or_else(|| ImportError::NoMapDirectory(path.to_path_buf()))?,
        };

        let subpath = subpath_for(&map_path, path);
        let text = match std::fs::read_to_string(&map_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        if let Some(entry) = find_entry(&text, &subpath) {
            if entry.signature.hash != hash {
                let mut patched = text.into_bytes();
                patched[entry.offset + HASH_OFFSET..entry.offset + HASH_OFFSET + 64]
                    .copy_from_slice(hash.to_hex().as_bytes());
                write_atomic(&map_path, &patched)?;
                debug!(path = %subpath, uuid = %entry.signature.uuid, "import map hash updated");
            }
            return Ok(entry.signature.uuid);
        }

        let mut appended = text;
        appended.push_str(&format_entry(&subpath, uuid, hash));
        write_atomic(&map_path, appended.as_bytes())?;
        debug!(path = %subpath, %uuid, "import map entry added");
        Ok(uuid)
    }

    /// Resolve a path to its signature, trying a connected remote first.
    pub fn lookup(&self, path: &Path) -> ImportResult<Option<Signature>> {
        if let Some(remote) = &self.remote {
            if remote.is_connected() {
                let relative = self
                    .base
                    .as_deref()
                    .and_then(|base| path.strip_prefix(base).ok())
                    .unwrap_or(path);
                if let Some(sig) = remote.lookup(&path_string(relative)) {
                    if !sig.is_null() {
                        return Ok(Some(sig));
                    }
                }
            }
        }
        self.lookup_local(path)
    }

    /// Resolve a path using local map files only.
    pub fn lookup_local(&self, path: &Path) -> ImportResult<Option<Signature>> {
        let Some(map_path) = find_map(path) else {
            return Ok(None);
        };
        let subpath = subpath_for(&map_path, path);
        let text = std::fs::read_to_string(&map_path)?;
        Ok(find_entry(&text, &subpath).map(|entry| entry.signature))
    }

    /// Find the source path mapped to `uuid` by scanning every map file
    /// under `root`. Linear in the tree size; intended for tooling, not
    /// hot paths.
    pub fn reverse_lookup(&self, root: &Path, uuid: ResourceId) -> ImportResult<Option<PathBuf>> {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_name() != MAP_FILE_NAME || !entry.file_type().is_file() {
                continue;
            }
            let text = std::fs::read_to_string(entry.path())?;
            for line in text.lines() {
                let Some(parsed) = parse_line(line) else { continue };
                if parsed.0.uuid == uuid {
                    let dir = entry.path().parent().unwrap_or(root);
                    return Ok(Some(dir.join(parsed.1)));
                }
            }
        }
        Ok(None)
    }
}

struct FoundEntry {
    signature: Signature,
    /// Byte offset of the record's line within the map file.
    offset: usize,
}

fn find_entry(text: &str, subpath: &str) -> Option<FoundEntry> {
    let pathhash = KeyHash::of(subpath);
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let record = line.trim_end_matches(['\n', '\r']);
        if let Some((signature, stored_path)) = parse_line(record) {
            // The hash field prefilters; the stored path decides.
            if KeyHash::from_hex(&record[0..16]).ok() == Some(pathhash)
                && stored_path == subpath
            {
                return Some(FoundEntry { signature, offset });
            }
        }
        offset += line.len();
    }
    None
}

fn parse_line(line: &str) -> Option<(Signature, &str)> {
    if line.len() < MIN_LINE || !line.is_ascii() {
        return None;
    }
    let uuid = ResourceId::parse(line[UUID_OFFSET..UUID_OFFSET + 36].trim()).ok()?;
    let hash = ContentHash::from_hex(&line[HASH_OFFSET..HASH_OFFSET + 64]).ok()?;
    Some((Signature::new(uuid, hash), &line[PATH_OFFSET..]))
}

fn format_entry(subpath: &str, uuid: ResourceId, hash: ContentHash) -> String {
    format!(
        "{:016x} {} {} {}\n",
        KeyHash::of(subpath).raw(),
        uuid.to_canonical(),
        hash.to_hex(),
        subpath
    )
}

/// The nearest `import.map` at or above the file's directory.
fn find_map(path: &Path) -> Option<PathBuf> {
    let mut dir = path.parent();
    while let Some(current) = dir {
        let candidate = current.join(MAP_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

/// The path as stored in a map file: relative to the map's directory
/// where possible, always forward-slashed.
fn subpath_for(map_path: &Path, path: &Path) -> String {
    let relative = map_path
        .parent()
        .and_then(|dir| path.strip_prefix(dir).ok())
        .unwrap_or(path);
    path_string(relative)
}

fn path_string(path: &Path) -> String {
    let text = path.to_string_lossy();
    if text.contains('\\') {
        text.replace('\\', "/")
    } else {
        text.into_owned()
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> ImportResult<()> {
    let parent = path.parent().ok_or_else(|| {
        ImportError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent",
        ))
    })?;
    std::fs::create_dir_all(parent)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(data)?;
    temp.persist(path).map_err(|e| {
        warn!(path = %path.display(), "import map rename failed");
        ImportError::Io(e.error)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_platform::Platform;
    use kiln_source::ChangeLog;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"asset bytes").unwrap();
    }

    #[test]
    fn store_assigns_uuid_on_first_import_and_reuses_it() {
        let dir = tempfile::tempdir().unwrap();
        let asset = dir.path().join("textures/brick.png");
        touch(&asset);
        let map = ImportMap::new();

        let first = map
            .store(&asset, ResourceId::generate(), ContentHash::of(b"v1"))
            .unwrap();
        // A second store with a fresh candidate returns the original uuid.
        let second = map
            .store(&asset, ResourceId::generate(), ContentHash::of(b"v1"))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn lookup_finds_stored_entry() {
        let dir = tempfile::tempdir().unwrap();
        let asset = dir.path().join("brick.png");
        touch(&asset);
        let map = ImportMap::new();

        let hash = ContentHash::of(b"content");
        let uuid = map.store(&asset, ResourceId::generate(), hash).unwrap();

        let sig = map.lookup(&asset).unwrap().unwrap();
        assert_eq!(sig.uuid, uuid);
        assert_eq!(sig.hash, hash);
    }

    #[test]
    fn lookup_of_unmapped_path_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let map = ImportMap::new();
        assert!(map.lookup(&dir.path().join("nothing.png")).unwrap().is_none());
    }

    #[test]
    fn changed_hash_is_patched_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let asset = dir.path().join("brick.png");
        let other = dir.path().join("stone.png");
        touch(&asset);
        touch(&other);
        let map = ImportMap::new();

        let uuid = map
            .store(&asset, ResourceId::generate(), ContentHash::of(b"v1"))
            .unwrap();
        let other_uuid = map
            .store(&other, ResourceId::generate(), ContentHash::of(b"x"))
            .unwrap();

        let updated = ContentHash::of(b"v2");
        let stored = map.store(&asset, ResourceId::generate(), updated).unwrap();
        assert_eq!(stored, uuid);

        let sig = map.lookup(&asset).unwrap().unwrap();
        assert_eq!(sig.uuid, uuid);
        assert_eq!(sig.hash, updated);

        // The neighboring entry is untouched.
        let other_sig = map.lookup(&other).unwrap().unwrap();
        assert_eq!(other_sig.uuid, other_uuid);
        assert_eq!(other_sig.hash, ContentHash::of(b"x"));

        // Still one line per asset: the update did not append.
        let text =
            std::fs::read_to_string(dir.path().join(MAP_FILE_NAME)).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn ancestor_map_is_inherited_by_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MAP_FILE_NAME), "").unwrap();
        let asset = dir.path().join("deep/nested/rock.png");
        touch(&asset);
        let map = ImportMap::new();

        let uuid = map
            .store(&asset, ResourceId::generate(), ContentHash::of(b"v"))
            .unwrap();

        // The entry landed in the root map with a relative path.
        let text =
            std::fs::read_to_string(dir.path().join(MAP_FILE_NAME)).unwrap();
        assert!(text.contains("deep/nested/rock.png"));
        assert!(!asset.parent().unwrap().join(MAP_FILE_NAME).exists());

        assert_eq!(map.lookup(&asset).unwrap().unwrap().uuid, uuid);
    }

    #[test]
    fn record_layout_is_fixed_width() {
        let dir = tempfile::tempdir().unwrap();
        let asset = dir.path().join("a.png");
        touch(&asset);
        let map = ImportMap::new();
        map.store(&asset, ResourceId::generate(), ContentHash::of(b"v"))
            .unwrap();

        let text =
            std::fs::read_to_string(dir.path().join(MAP_FILE_NAME)).unwrap();
        let line = text.lines().next().unwrap();
        assert!(line.len() >= 120);
        assert_eq!(line.as_bytes()[16], b' ');
        assert_eq!(line.as_bytes()[53], b' ');
        assert_eq!(line.as_bytes()[118], b' ');
        assert_eq!(&line[119..], "a.png");
    }

    #[test]
    fn short_lines_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let asset = dir.path().join("a.png");
        touch(&asset);
        std::fs::write(dir.path().join(MAP_FILE_NAME), "garbage line\n").unwrap();
        let map = ImportMap::new();

        assert!(map.lookup(&asset).unwrap().is_none());
        // Storing appends past the garbage without failing.
        let uuid = map
            .store(&asset, ResourceId::generate(), ContentHash::of(b"v"))
            .unwrap();
        assert_eq!(map.lookup(&asset).unwrap().unwrap().uuid, uuid);
    }

    #[test]
    fn reverse_lookup_walks_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let asset = dir.path().join("models/chair.obj");
        touch(&asset);
        let map = ImportMap::new();
        let uuid = map
            .store(&asset, ResourceId::generate(), ContentHash::of(b"v"))
            .unwrap();

        let found = map.reverse_lookup(dir.path(), uuid).unwrap().unwrap();
        assert_eq!(found, asset);
        assert!(map
            .reverse_lookup(dir.path(), ResourceId::generate())
            .unwrap()
            .is_none());
    }

    struct FakeRemote {
        signature: Signature,
        expected_path: String,
    }

    impl RemoteSource for FakeRemote {
        fn is_connected(&self) -> bool {
            true
        }
        fn lookup(&self, path: &str) -> Option<Signature> {
            (path == self.expected_path).then_some(self.signature)
        }
        fn read(&self, _uuid: ResourceId) -> Option<ChangeLog> {
            None
        }
        fn hash(&self, _uuid: ResourceId, _platform: Platform) -> Option<ContentHash> {
            None
        }
        fn dependencies(
            &self,
            _uuid: ResourceId,
            _platform: Platform,
        ) -> Option<Vec<ResourceId>> {
            None
        }
        fn read_blob(
            &self,
            _uuid: ResourceId,
            _key: kiln_types::KeyHash,
            _platform: Platform,
            _checksum: u64,
        ) -> Option<Vec<u8>> {
            None
        }
    }

    #[test]
    fn connected_remote_answers_lookup_with_base_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let signature = Signature::new(ResourceId::generate(), ContentHash::of(b"remote"));
        let map = ImportMap::new()
            .with_base(dir.path())
            .with_remote(Arc::new(FakeRemote {
                signature,
                expected_path: "textures/brick.png".into(),
            }));

        let sig = map
            .lookup(&dir.path().join("textures/brick.png"))
            .unwrap()
            .unwrap();
        assert_eq!(sig, signature);
    }
}
