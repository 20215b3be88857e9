use std::path::PathBuf;

/// Errors from import-map and importer operations.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] kiln_store::StoreError),

    /// No registered importer claimed the file.
    #[error("no importer for {0}")]
    NoImporter(PathBuf),

    /// The path has no parent directory to hold a map file.
    #[error("no directory for import map of {0}")]
    NoMapDirectory(PathBuf),
}

/// Result alias for import operations.
pub type ImportResult<T> = Result<T, ImportError>;
