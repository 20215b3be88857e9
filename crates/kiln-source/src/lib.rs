//! Append-only change log for kiln resources.
//!
//! A resource's source data is a timestamped key/value store: an ordered
//! sequence of [`Change`] records, each setting a string value, referencing
//! a binary blob, or unsetting a key for one platform variant. The log is
//! append-only in memory; persistence rewrites the serialized form whole.
//!
//! Resolution ([`ChangeLog::get_best`]) picks the winning record for a
//! (key, platform) request: most specific compatible platform wins, newest
//! timestamp breaks ties, and a winning tombstone suppresses the match.
//!
//! The log is not required to be time-sorted; callers may supply their own
//! timestamps and resolution never assumes sortedness.

pub mod change;
pub mod error;
pub mod io;
pub mod log;

pub use change::{Change, ChangeOp};
pub use error::{SourceError, SourceResult};
pub use io::{content_hash, deserialize, serialize, SourceFormat};
pub use log::ChangeLog;
