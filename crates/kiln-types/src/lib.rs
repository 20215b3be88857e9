//! Foundation types for the kiln resource pipeline.
//!
//! This crate provides the identifier and hash types used throughout the
//! kiln system. Every other kiln crate depends on `kiln-types`.
//!
//! # Key Types
//!
//! - [`ResourceId`] — 128-bit resource identifier (UUID), the primary key
//!   for all resource data
//! - [`KeyHash`] — 64-bit hash of a change-record key name
//! - [`ContentHash`] — 256-bit BLAKE3 content hash
//! - [`BlobRef`] — checksum + size descriptor for a stored binary payload
//! - [`Signature`] — resource identity paired with a content hash, used to
//!   decide whether re-import or re-compile is needed

pub mod blob;
pub mod error;
pub mod hash;
pub mod id;
pub mod time;

pub use blob::BlobRef;
pub use error::TypeError;
pub use hash::{ContentHash, KeyHash};
pub use id::{ResourceId, Signature};
pub use time::{tick_now, Tick};
