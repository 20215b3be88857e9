//! Import-map lookup and the importer registry.
//!
//! Raw asset files live outside the store; the import map ties a file
//! path to the stable [`ResourceId`](kiln_types::ResourceId) assigned on
//! first import, plus the content hash the file had when last imported.
//! Map files are plain text, one per directory tree, found by walking up
//! from the asset towards the filesystem root.
//!
//! [`ImporterRegistry`] drives the import itself: pick the first importer
//! claiming the file, let it populate the resource's change log, then
//! record the input hash so unchanged files are skipped next time.

pub mod error;
pub mod importer;
pub mod map;

pub use error::{ImportError, ImportResult};
pub use importer::{Importer, ImporterRegistry};
pub use map::ImportMap;
