//! Forward and reverse dependency edges.
//!
//! Each resource owns two small flat files: `.deps` lists the resources it
//! depends on, `.revdeps` lists the resources depending on it. Every line
//! covers one platform variant:
//!
//! ```text
//! <count> <platform-hex> <uuid_0> <uuid_1> ... <uuid_n-1>
//! ```
//!
//! The two files are kept symmetric: setting the forward list diffs old
//! against new edges and applies only the delta to the affected resources'
//! reverse files. A malformed line is skipped with a warning and dropped
//! on the next rewrite of its file.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kiln_platform::Platform;
use kiln_types::ResourceId;

use crate::error::StoreResult;
use crate::paths;
use crate::store::{write_atomic, LocalStore};

/// One directed dependency edge as seen from either end: the resource at
/// the far end plus the platform variant the edge applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub uuid: ResourceId,
    pub platform: Platform,
}

impl LocalStore {
    /// Resources `uuid` depends on, for the given platform.
    ///
    /// A stored edge applies when its platform is equal-or-more-specific
    /// than the query: asking "what does the windows-x64 build depend on"
    /// must see edges recorded for windows-x64 and narrower variants.
    pub fn dependencies(
        &self,
        uuid: ResourceId,
        platform: Platform,
    ) -> StoreResult<Vec<Dependency>> {
        if let Some(remote) = self.connected_remote() {
            if let Some(deps) = remote.dependencies(uuid, platform) {
                return Ok(deps
                    .into_iter()
                    .map(|uuid| Dependency { uuid, platform })
                    .collect());
            }
        }
        let lines = read_edge_file(&paths::deps(self.base(), uuid))?;
        Ok(collect_edges(&lines, |stored| {
            stored.is_equal_or_more_specific(platform)
        }))
    }

    /// Resources depending on `uuid`, for the given platform.
    ///
    /// The filter direction inverts: a reverse edge recorded for windows
    /// applies when asking at windows-x64, since anything depending on the
    /// windows variant is affected by a change visible there.
    pub fn reverse_dependencies(
        &self,
        uuid: ResourceId,
        platform: Platform,
    ) -> StoreResult<Vec<Dependency>> {
        let lines = read_edge_file(&paths::revdeps(self.base(), uuid))?;
        Ok(collect_edges(&lines, |stored| {
            platform.is_equal_or_more_specific(stored)
        }))
    }

    /// Replace the forward dependency list of `uuid` for one platform and
    /// bring the affected reverse files in line.
    ///
    /// Only the delta touches reverse files: edges in the new list but not
    /// the old are reverse-added, edges in the old list but not the new
    /// are reverse-removed. The forward rewrite happens under `uuid`'s
    /// lock; each reverse update then takes the target's own lock, so no
    /// two resource locks are ever held at once.
    pub fn set_dependencies(
        &self,
        uuid: ResourceId,
        platform: Platform,
        deps: &[ResourceId],
    ) -> StoreResult<()> {
        let old: HashSet<ResourceId> = {
            let lock = self.resource_lock(uuid);
            let _guard = lock.lock().expect("resource lock poisoned");

            let path = paths::deps(self.base(), uuid);
            let mut lines = read_edge_file(&path)?;
            let old = lines
                .iter()
                .find(|(p, _)| *p == platform)
                .map(|(_, edges)| edges.iter().copied().collect())
                .unwrap_or_default();

            lines.retain(|(p, _)| *p != platform);
            if !deps.is_empty() {
                lines.push((platform, deps.to_vec()));
            }
            write_edge_file(&path, &lines)?;
            old
        };

        let new: HashSet<ResourceId> = deps.iter().copied().collect();
        for &added in new.difference(&old) {
            self.add_reverse_dependency(added, platform, uuid)?;
        }
        for &removed in old.difference(&new) {
            self.remove_reverse_dependency(removed, platform, uuid)?;
        }
        debug!(%uuid, platform = %platform, count = deps.len(), "dependencies set");
        Ok(())
    }

    /// Record that `dep` depends on `uuid` at `platform`. No-op if the
    /// edge is already present.
    pub fn add_reverse_dependency(
        &self,
        uuid: ResourceId,
        platform: Platform,
        dep: ResourceId,
    ) -> StoreResult<()> {
        let lock = self.resource_lock(uuid);
        let _guard = lock.lock().expect("resource lock poisoned");

        let path = paths::revdeps(self.base(), uuid);
        let mut lines = read_edge_file(&path)?;
        match lines.iter_mut().find(|(p, _)| *p == platform) {
            Some((_, edges)) => {
                if edges.contains(&dep) {
                    return Ok(());
                }
                edges.push(dep);
            }
            None => lines.push((platform, vec![dep])),
        }
        write_edge_file(&path, &lines)
    }

    /// Remove the record that `dep` depends on `uuid` at `platform`.
    /// No-op if the edge is absent.
    pub fn remove_reverse_dependency(
        &self,
        uuid: ResourceId,
        platform: Platform,
        dep: ResourceId,
    ) -> StoreResult<()> {
        let lock = self.resource_lock(uuid);
        let _guard = lock.lock().expect("resource lock poisoned");

        let path = paths::revdeps(self.base(), uuid);
        let mut lines = read_edge_file(&path)?;
        let Some((_, edges)) = lines.iter_mut().find(|(p, _)| *p == platform) else {
            return Ok(());
        };
        let before = edges.len();
        edges.retain(|e| *e != dep);
        if edges.len() == before {
            return Ok(());
        }
        lines.retain(|(_, edges)| !edges.is_empty());
        write_edge_file(&path, &lines)
    }
}

fn collect_edges(
    lines: &[(Platform, Vec<ResourceId>)],
    mut filter: impl FnMut(Platform) -> bool,
) -> Vec<Dependency> {
    lines
        .iter()
        .filter(|(platform, _)| filter(*platform))
        .flat_map(|(platform, edges)| {
            edges.iter().map(|&uuid| Dependency {
                uuid,
                platform: *platform,
            })
        })
        .collect()
}

fn read_edge_file(path: &Path) -> StoreResult<Vec<(Platform, Vec<ResourceId>)>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut lines = Vec::new();
    for (number, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        match parse_edge_line(line) {
            Some(parsed) => lines.push(parsed),
            None => {
                warn!(
                    path = %path.display(),
                    line = number + 1,
                    "malformed dependency line skipped"
                );
            }
        }
    }
    Ok(lines)
}

fn parse_edge_line(line: &str) -> Option<(Platform, Vec<ResourceId>)> {
    let mut tokens = line.split_whitespace();
    let count: usize = tokens.next()?.parse().ok()?;
    let platform = Platform::from_bits(u64::from_str_radix(tokens.next()?, 16).ok()?);
    let edges: Vec<ResourceId> = tokens
        .map(ResourceId::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if edges.len() != count {
        return None;
    }
    Some((platform, edges))
}

fn write_edge_file(path: &Path, lines: &[(Platform, Vec<ResourceId>)]) -> StoreResult<()> {
    let mut text = String::new();
    for (platform, edges) in lines {
        text.push_str(&format!("{} {:x}", edges.len(), platform.bits()));
        for edge in edges {
            text.push(' ');
            text.push_str(&edge.to_canonical());
        }
        text.push('\n');
    }
    write_atomic(path, text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_platform::PlatformDeclaration;
    use crate::store::LocalStore;

    fn store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        (dir, store)
    }

    fn platform(platform: Option<u8>, arch: Option<u8>) -> Platform {
        Platform::encode(PlatformDeclaration {
            platform,
            arch,
            ..Default::default()
        })
    }

    fn uuids(deps: &[Dependency]) -> HashSet<ResourceId> {
        deps.iter().map(|d| d.uuid).collect()
    }

    #[test]
    fn set_dependencies_creates_symmetric_reverse_edges() {
        let (_dir, store) = store();
        let (a, b, c) = (
            ResourceId::generate(),
            ResourceId::generate(),
            ResourceId::generate(),
        );
        let p = platform(Some(1), None);
        store.set_dependencies(a, p, &[b, c]).unwrap();

        assert_eq!(
            uuids(&store.dependencies(a, p).unwrap()),
            HashSet::from([b, c])
        );
        assert_eq!(
            uuids(&store.reverse_dependencies(b, p).unwrap()),
            HashSet::from([a])
        );
        assert_eq!(
            uuids(&store.reverse_dependencies(c, p).unwrap()),
            HashSet::from([a])
        );
    }

    #[test]
    fn set_dependencies_applies_only_the_delta() {
        let (_dir, store) = store();
        let (a, b, c) = (
            ResourceId::generate(),
            ResourceId::generate(),
            ResourceId::generate(),
        );
        let p = platform(Some(1), None);
        store.set_dependencies(a, p, &[b, c]).unwrap();
        store.set_dependencies(a, p, &[c]).unwrap();

        assert!(store.reverse_dependencies(b, p).unwrap().is_empty());
        assert_eq!(
            uuids(&store.reverse_dependencies(c, p).unwrap()),
            HashSet::from([a])
        );
    }

    #[test]
    fn empty_list_clears_the_platform_line() {
        let (_dir, store) = store();
        let (a, b) = (ResourceId::generate(), ResourceId::generate());
        let p = platform(Some(1), None);
        store.set_dependencies(a, p, &[b]).unwrap();
        store.set_dependencies(a, p, &[]).unwrap();

        assert!(store.dependencies(a, p).unwrap().is_empty());
        assert!(store.reverse_dependencies(b, p).unwrap().is_empty());
    }

    #[test]
    fn platform_lines_are_independent() {
        let (_dir, store) = store();
        let (a, b, c) = (
            ResourceId::generate(),
            ResourceId::generate(),
            ResourceId::generate(),
        );
        let win = platform(Some(1), None);
        let linux = platform(Some(2), None);
        store.set_dependencies(a, win, &[b]).unwrap();
        store.set_dependencies(a, linux, &[c]).unwrap();

        assert_eq!(uuids(&store.dependencies(a, win).unwrap()), HashSet::from([b]));
        assert_eq!(
            uuids(&store.dependencies(a, linux).unwrap()),
            HashSet::from([c])
        );
    }

    #[test]
    fn forward_query_sees_more_specific_edges() {
        let (_dir, store) = store();
        let (a, b) = (ResourceId::generate(), ResourceId::generate());
        let win = platform(Some(1), None);
        let win_x64 = platform(Some(1), Some(2));
        store.set_dependencies(a, win_x64, &[b]).unwrap();

        // The narrower stored edge shows up when asking at the broader
        // platform, not the other way around.
        assert_eq!(uuids(&store.dependencies(a, win).unwrap()), HashSet::from([b]));
        assert_eq!(
            uuids(&store.dependencies(a, Platform::WILDCARD).unwrap()),
            HashSet::from([b])
        );
    }

    #[test]
    fn reverse_query_sees_broader_edges() {
        let (_dir, store) = store();
        let (a, b) = (ResourceId::generate(), ResourceId::generate());
        let win = platform(Some(1), None);
        let win_x64 = platform(Some(1), Some(2));
        store.set_dependencies(a, win, &[b]).unwrap();

        // Reverse edges stored at windows apply when asking at windows-x64.
        assert_eq!(
            uuids(&store.reverse_dependencies(b, win_x64).unwrap()),
            HashSet::from([a])
        );
        // A disjoint platform sees nothing.
        assert!(store
            .reverse_dependencies(b, platform(Some(2), None))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn add_reverse_dependency_is_idempotent() {
        let (dir, store) = store();
        let (a, b) = (ResourceId::generate(), ResourceId::generate());
        let p = platform(Some(1), None);
        store.add_reverse_dependency(b, p, a).unwrap();
        store.add_reverse_dependency(b, p, a).unwrap();

        assert_eq!(store.reverse_dependencies(b, p).unwrap().len(), 1);
        let text = std::fs::read_to_string(paths::revdeps(dir.path(), b)).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn remove_absent_reverse_dependency_is_a_noop() {
        let (_dir, store) = store();
        let (a, b) = (ResourceId::generate(), ResourceId::generate());
        store
            .remove_reverse_dependency(b, platform(Some(1), None), a)
            .unwrap();
        assert!(store
            .reverse_dependencies(b, platform(Some(1), None))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn malformed_line_is_skipped() {
        let (dir, store) = store();
        let (a, b) = (ResourceId::generate(), ResourceId::generate());
        let p = platform(Some(1), None);
        store.set_dependencies(a, p, &[b]).unwrap();

        // Append a line whose count does not match its edge list.
        let path = paths::deps(dir.path(), a);
        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str(&format!("3 1 {}\n", ResourceId::generate().to_canonical()));
        std::fs::write(&path, text).unwrap();

        assert_eq!(uuids(&store.dependencies(a, p).unwrap()), HashSet::from([b]));
    }

    #[test]
    fn edge_file_format() {
        let (dir, store) = store();
        let (a, b, c) = (
            ResourceId::generate(),
            ResourceId::generate(),
            ResourceId::generate(),
        );
        let p = platform(Some(1), Some(2));
        store.set_dependencies(a, p, &[b, c]).unwrap();

        let text = std::fs::read_to_string(paths::deps(dir.path(), a)).unwrap();
        let line = text.lines().next().unwrap();
        assert_eq!(
            line,
            format!("2 {:x} {} {}", p.bits(), b.to_canonical(), c.to_canonical())
        );
    }
}
