use kiln_types::ResourceId;

/// Errors from local store operations.
///
/// "Not found" and checksum mismatches are not errors: those surface as
/// `Ok(None)` so callers can chain fallback strategies (local to remote,
/// reimport, recompile).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored change log could not be parsed.
    #[error("corrupt source for {uuid}: {source}")]
    CorruptSource {
        uuid: ResourceId,
        #[source]
        source: kiln_source::SourceError,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle involving {0}")]
    DependencyCycle(ResourceId),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
