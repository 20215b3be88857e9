use std::collections::{HashMap, HashSet};

use kiln_platform::Platform;
use kiln_types::{BlobRef, KeyHash, Tick};

use crate::change::{Change, ChangeOp};

/// The append-only change log of one resource.
///
/// Not internally synchronized; callers serialize access per resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeLog {
    changes: Vec<Change>,
    /// Whether the last deserialization read the binary encoding. Saves
    /// rewrite the format they were read in unless told otherwise.
    read_binary: bool,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a string value change.
    pub fn set(&mut self, timestamp: Tick, key: KeyHash, platform: Platform, value: &str) {
        self.changes.push(Change {
            timestamp,
            key,
            platform,
            op: ChangeOp::Value(value.to_owned()),
        });
    }

    /// Append a blob descriptor change. The payload bytes live in the blob
    /// store, not in the log.
    pub fn set_blob(&mut self, timestamp: Tick, key: KeyHash, platform: Platform, blob: BlobRef) {
        self.changes.push(Change {
            timestamp,
            key,
            platform,
            op: ChangeOp::Blob(blob),
        });
    }

    /// Append a tombstone.
    pub fn unset(&mut self, timestamp: Tick, key: KeyHash, platform: Platform) {
        self.changes.push(Change {
            timestamp,
            key,
            platform,
            op: ChangeOp::Unset,
        });
    }

    pub(crate) fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    pub fn read_binary(&self) -> bool {
        self.read_binary
    }

    pub(crate) fn set_read_binary(&mut self, binary: bool) {
        self.read_binary = binary;
    }

    /// Resolve the winning record for a (key, platform) request.
    ///
    /// Candidates are records whose platform the request is equal-or-more-
    /// specific than. Among candidates the more specific stored platform
    /// wins; equal platforms are decided by timestamp, newest first. A
    /// winning tombstone suppresses the match.
    ///
    /// Linear in the total change count; collapse is expected to keep logs
    /// small.
    pub fn get_best(&self, key: KeyHash, platform: Platform) -> Option<&Change> {
        let winner = self
            .changes
            .iter()
            .filter(|c| c.key == key && platform.is_equal_or_more_specific(c.platform))
            .fold(None::<&Change>, |best, candidate| match best {
                None => Some(candidate),
                Some(best) => Some(Self::prefer(best, candidate)),
            })?;
        if winner.is_unset() {
            None
        } else {
            Some(winner)
        }
    }

    /// Pick between two candidate records for the same key.
    fn prefer<'a>(best: &'a Change, candidate: &'a Change) -> &'a Change {
        if candidate.platform == best.platform {
            if candidate.timestamp >= best.timestamp {
                candidate
            } else {
                best
            }
        } else if candidate.platform.is_equal_or_more_specific(best.platform) {
            candidate
        } else {
            best
        }
    }

    /// Destructively compact the history to the newest record per distinct
    /// (key, platform) pair.
    ///
    /// Intermediate historical values are lost; this is a disk-space and
    /// scan-time optimization, invoked explicitly, never automatically.
    /// Tombstones survive when newest for their platform: they still
    /// suppress less specific values at resolution time.
    pub fn collapse_history(&mut self) {
        let mut newest: HashMap<(KeyHash, Platform), usize> = HashMap::new();
        for (index, change) in self.changes.iter().enumerate() {
            let slot = newest.entry((change.key, change.platform)).or_insert(index);
            if self.changes[*slot].timestamp <= change.timestamp {
                *slot = index;
            }
        }

        let mut surviving: Vec<usize> = newest.into_values().collect();
        surviving.sort_unstable();

        let mut index = 0;
        self.changes.retain(|_| {
            let keep = surviving.binary_search(&index).is_ok();
            index += 1;
            keep
        });
    }

    /// The set of blob descriptors referenced by any record in the log,
    /// across all timestamps.
    ///
    /// This is the surviving set for blob pruning: a blob file on disk
    /// whose (key, platform, checksum) is absent here is unreferenced and
    /// safe to delete.
    pub fn blob_refs(&self) -> HashSet<(KeyHash, Platform, BlobRef)> {
        self.changes
            .iter()
            .filter_map(|c| c.blob().map(|blob| (c.key, c.platform, blob)))
            .collect()
    }

    /// All distinct keys present in the log.
    pub fn keys(&self) -> HashSet<KeyHash> {
        self.changes.iter().map(|c| c.key).collect()
    }
}

impl<'a> IntoIterator for &'a ChangeLog {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
