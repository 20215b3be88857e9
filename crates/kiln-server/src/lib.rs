//! The sourced service.
//!
//! Accepts framed TCP connections and serves source-side resource data
//! out of a [`LocalStore`](kiln_store::LocalStore): path lookup via the
//! import map, change log reads, transitive hashes, dependency lists and
//! blob payloads. Requests the service does not implement are answered
//! with their paired result carrying `Status::Unsupported` rather than
//! dropped, so clients distinguish "old server" from "broken stream".
//!
//! Store mutations flow in from the host process (importer, watcher);
//! the server broadcasts a notification to every connected client when
//! told a resource changed.

pub mod config;
pub mod server;

pub use config::ServerConfig;
pub use server::{Notify, ServerError, ServerResult, SourcedServer};
