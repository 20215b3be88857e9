use kiln_platform::Platform;
use kiln_types::{BlobRef, KeyHash, Tick};
use serde::{Deserialize, Serialize};

/// The payload of a change record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOp {
    /// Set the key to a string value. The record owns the bytes.
    Value(String),
    /// Set the key to a binary payload stored in the blob store.
    Blob(BlobRef),
    /// Tombstone: suppress any earlier value at this key and platform.
    Unset,
}

/// One logged mutation of a resource key under a platform variant.
///
/// Changes are never mutated once appended; read-path resolution is the
/// only place that orders them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Logical write-time clock, used only to break ties between changes
    /// sharing the same key and platform.
    pub timestamp: Tick,
    /// Hash of the key name.
    pub key: KeyHash,
    /// Platform variant this change applies to.
    pub platform: Platform,
    /// The mutation itself.
    pub op: ChangeOp,
}

impl Change {
    pub fn is_value(&self) -> bool {
        matches!(self.op, ChangeOp::Value(_))
    }

    pub fn is_blob(&self) -> bool {
        matches!(self.op, ChangeOp::Blob(_))
    }

    pub fn is_unset(&self) -> bool {
        matches!(self.op, ChangeOp::Unset)
    }

    /// The string value, if this is a value change.
    pub fn value(&self) -> Option<&str> {
        match &self.op {
            ChangeOp::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The blob descriptor, if this is a blob change.
    pub fn blob(&self) -> Option<BlobRef> {
        match self.op {
            ChangeOp::Blob(blob) => Some(blob),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_accessors() {
        let value = Change {
            timestamp: 1,
            key: KeyHash::of("k"),
            platform: Platform::WILDCARD,
            op: ChangeOp::Value("v".into()),
        };
        assert!(value.is_value());
        assert_eq!(value.value(), Some("v"));
        assert_eq!(value.blob(), None);

        let blob = Change {
            op: ChangeOp::Blob(BlobRef::new(7, 128)),
            ..value.clone()
        };
        assert!(blob.is_blob());
        assert_eq!(blob.blob(), Some(BlobRef::new(7, 128)));
        assert_eq!(blob.value(), None);

        let unset = Change {
            op: ChangeOp::Unset,
            ..value
        };
        assert!(unset.is_unset());
    }
}
