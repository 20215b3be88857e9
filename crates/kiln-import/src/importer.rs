use std::path::Path;

use tracing::{debug, info};

use kiln_store::LocalStore;
use kiln_types::{ContentHash, ResourceId};

use crate::error::{ImportError, ImportResult};
use crate::map::ImportMap;

/// One pluggable asset importer.
///
/// Importers read a raw asset file and populate the resource's change
/// log in the store. Selection is first-claim: the registry asks each
/// importer in registration order and runs the first that accepts the
/// path.
pub trait Importer: Send + Sync {
    /// Name for diagnostics.
    fn name(&self) -> &str;

    /// Whether this importer handles the given file.
    fn can_import(&self, path: &Path) -> bool;

    /// Import the file into the resource `uuid`.
    fn import(&self, store: &LocalStore, path: &Path, uuid: ResourceId) -> ImportResult<()>;
}

/// Ordered collection of importers plus the import driver.
#[derive(Default)]
pub struct ImporterRegistry {
    importers: Vec<Box<dyn Importer>>,
}

impl ImporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, importer: Box<dyn Importer>) {
        self.importers.push(importer);
    }

    pub fn is_empty(&self) -> bool {
        self.importers.is_empty()
    }

    /// Import one file: resolve or assign its uuid through the map, skip
    /// the work entirely when the file's content hash matches the
    /// recorded input hash of the last import, otherwise run the first
    /// claiming importer and record the new input hash.
    ///
    /// Returns the resource uuid, whether or not an import ran.
    pub fn import_file(
        &self,
        store: &LocalStore,
        map: &ImportMap,
        path: &Path,
    ) -> ImportResult<ResourceId> {
        let data = std::fs::read(path)?;
        let hash = ContentHash::of(&data);
        let uuid = map.store(path, ResourceId::generate(), hash)?;

        if store.import_hash(uuid)? == Some(hash) {
            debug!(path = %path.display(), %uuid, "import skipped, input unchanged");
            return Ok(uuid);
        }

        let importer = self
            .importers
            .iter()
            .find(|i| i.can_import(path))
            .ok_or_else(|| ImportError::NoImporter(path.to_path_buf()))?;
        importer.import(store, path, uuid)?;
        store.set_import_hash(uuid, hash)?;
        info!(path = %path.display(), %uuid, importer = importer.name(), "imported");
        Ok(uuid)
    }
}
