//! Transitive content hashing.
//!
//! The staleness signal for compiled output: a resource's signature hash
//! covers its own serialized source plus, recursively, every dependency's
//! signature for the same platform. Compiled artifacts tagged with the
//! hash they were built from can be checked with one comparison, no graph
//! walk at the call site.

use tracing::debug;

use kiln_platform::Platform;
use kiln_types::{ContentHash, ResourceId};

use crate::error::{StoreError, StoreResult};
use crate::store::LocalStore;

impl LocalStore {
    /// The transitive content hash of a resource for one platform.
    ///
    /// A connected remote answers authoritatively (it runs the same
    /// recursion on its side). Locally, a resource with no dependencies
    /// hashes to its stored `.hash` value; otherwise the digest chains the
    /// own hash with each dependency's transitive hash, in stored edge
    /// order. Dependencies with no hash of their own contribute nothing,
    /// matching the "missing means needs import" convention.
    ///
    /// Returns `Ok(None)` if the resource itself has no stored hash, and
    /// an error if the dependency graph has a cycle.
    pub fn signature_hash(
        &self,
        uuid: ResourceId,
        platform: Platform,
    ) -> StoreResult<Option<ContentHash>> {
        if let Some(remote) = self.connected_remote() {
            if let Some(hash) = remote.hash(uuid, platform) {
                if !hash.is_null() {
                    debug!(%uuid, "signature hash from remote");
                    return Ok(Some(hash));
                }
            }
        }
        let mut path = Vec::new();
        self.signature_hash_local(uuid, platform, &mut path)
    }

    /// Recursive step. `path` holds the resources currently being hashed
    /// on this branch; revisiting one means the graph has a cycle. It is
    /// a stack, not a visited set: diamonds in the graph are legal and
    /// hash their shared dependency once per incoming edge.
    fn signature_hash_local(
        &self,
        uuid: ResourceId,
        platform: Platform,
        path: &mut Vec<ResourceId>,
    ) -> StoreResult<Option<ContentHash>> {
        if path.contains(&uuid) {
            return Err(StoreError::DependencyCycle(uuid));
        }

        let Some(own) = self.source_hash(uuid)? else {
            return Ok(None);
        };
        let deps = self.dependencies(uuid, platform)?;
        if deps.is_empty() {
            return Ok(Some(own));
        }

        path.push(uuid);
        let mut hasher = blake3::Hasher::new();
        hasher.update(own.as_bytes());
        for dep in deps {
            if let Some(hash) = self.signature_hash_local(dep.uuid, platform, path)? {
                hasher.update(hash.as_bytes());
            }
        }
        path.pop();
        Ok(Some(hasher.finalize().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_source::{ChangeLog, SourceFormat};
    use kiln_types::KeyHash;

    fn store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        (dir, store)
    }

    fn write_value(store: &LocalStore, uuid: ResourceId, value: &str) {
        let mut log = ChangeLog::new();
        log.set(1, KeyHash::of("data"), Platform::WILDCARD, value);
        store.write_source(uuid, &log, SourceFormat::Text).unwrap();
    }

    #[test]
    fn leaf_hash_is_the_stored_hash() {
        let (_dir, store) = store();
        let uuid = ResourceId::generate();
        write_value(&store, uuid, "leaf");

        let expected = store.source_hash(uuid).unwrap().unwrap();
        let hash = store
            .signature_hash(uuid, Platform::WILDCARD)
            .unwrap()
            .unwrap();
        assert_eq!(hash, expected);
    }

    #[test]
    fn missing_resource_has_no_hash() {
        let (_dir, store) = store();
        assert!(store
            .signature_hash(ResourceId::generate(), Platform::WILDCARD)
            .unwrap()
            .is_none());
    }

    #[test]
    fn dependency_change_changes_the_hash() {
        let (_dir, store) = store();
        let (a, b) = (ResourceId::generate(), ResourceId::generate());
        write_value(&store, a, "parent");
        write_value(&store, b, "child v1");
        store.set_dependencies(a, Platform::WILDCARD, &[b]).unwrap();

        let first = store
            .signature_hash(a, Platform::WILDCARD)
            .unwrap()
            .unwrap();

        // Parent unchanged, child edited: the parent's hash must move.
        write_value(&store, b, "child v2");
        let second = store
            .signature_hash(a, Platform::WILDCARD)
            .unwrap()
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn unchanged_graph_hashes_identically() {
        let (_dir, store) = store();
        let (a, b) = (ResourceId::generate(), ResourceId::generate());
        write_value(&store, a, "parent");
        write_value(&store, b, "child");
        store.set_dependencies(a, Platform::WILDCARD, &[b]).unwrap();

        let first = store.signature_hash(a, Platform::WILDCARD).unwrap();
        let second = store.signature_hash(a, Platform::WILDCARD).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn combined_hash_differs_from_own_hash() {
        let (_dir, store) = store();
        let (a, b) = (ResourceId::generate(), ResourceId::generate());
        write_value(&store, a, "parent");
        write_value(&store, b, "child");
        store.set_dependencies(a, Platform::WILDCARD, &[b]).unwrap();

        let own = store.source_hash(a).unwrap().unwrap();
        let combined = store
            .signature_hash(a, Platform::WILDCARD)
            .unwrap()
            .unwrap();
        assert_ne!(own, combined);
    }

    #[test]
    fn transitive_dependency_change_propagates() {
        let (_dir, store) = store();
        let (a, b, c) = (
            ResourceId::generate(),
            ResourceId::generate(),
            ResourceId::generate(),
        );
        write_value(&store, a, "a");
        write_value(&store, b, "b");
        write_value(&store, c, "c v1");
        store.set_dependencies(a, Platform::WILDCARD, &[b]).unwrap();
        store.set_dependencies(b, Platform::WILDCARD, &[c]).unwrap();

        let first = store
            .signature_hash(a, Platform::WILDCARD)
            .unwrap()
            .unwrap();
        write_value(&store, c, "c v2");
        let second = store
            .signature_hash(a, Platform::WILDCARD)
            .unwrap()
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn diamond_graphs_are_legal() {
        let (_dir, store) = store();
        let (a, b, c, d) = (
            ResourceId::generate(),
            ResourceId::generate(),
            ResourceId::generate(),
            ResourceId::generate(),
        );
        for (uuid, value) in [(a, "a"), (b, "b"), (c, "c"), (d, "d")] {
            write_value(&store, uuid, value);
        }
        store
            .set_dependencies(a, Platform::WILDCARD, &[b, c])
            .unwrap();
        store.set_dependencies(b, Platform::WILDCARD, &[d]).unwrap();
        store.set_dependencies(c, Platform::WILDCARD, &[d]).unwrap();

        assert!(store
            .signature_hash(a, Platform::WILDCARD)
            .unwrap()
            .is_some());
    }

    #[test]
    fn cycle_is_an_error() {
        let (_dir, store) = store();
        let (a, b) = (ResourceId::generate(), ResourceId::generate());
        write_value(&store, a, "a");
        write_value(&store, b, "b");
        store.set_dependencies(a, Platform::WILDCARD, &[b]).unwrap();
        store.set_dependencies(b, Platform::WILDCARD, &[a]).unwrap();

        assert!(matches!(
            store.signature_hash(a, Platform::WILDCARD),
            Err(StoreError::DependencyCycle(_))
        ));
    }

    #[test]
    fn missing_dependency_hash_contributes_nothing() {
        let (_dir, store) = store();
        let (a, missing) = (ResourceId::generate(), ResourceId::generate());
        write_value(&store, a, "a");
        store
            .set_dependencies(a, Platform::WILDCARD, &[missing])
            .unwrap();

        // Still hashable: the absent dependency is simply skipped.
        assert!(store
            .signature_hash(a, Platform::WILDCARD)
            .unwrap()
            .is_some());
    }
}
