//! Local on-disk store for kiln resources.
//!
//! Every resource's data lives under a UUID-sharded directory:
//!
//! ```text
//! <base>/<uuid[0:2]>/<uuid[2:4]>/<uuid>                 change log
//! <base>/.../<uuid>.hash                                content hash
//! <base>/.../<uuid>.deps                                forward dependency edges
//! <base>/.../<uuid>.revdeps                             reverse dependency edges
//! <base>/.../<uuid>.<key>.<platform>.<checksum>.blob    blob payload
//! <base>/.../<uuid>.importhash                          last import input hash
//! ```
//!
//! [`LocalStore`] is the context handle threaded through all operations;
//! there is no process-wide state, so tests can run several independent
//! stores side by side. Read-modify-write file updates take a per-resource
//! lock and land via write-to-temp-then-rename.

pub mod blobs;
pub mod config;
pub mod deps;
pub mod error;
pub mod paths;
pub mod remote;
pub mod signature;
pub mod store;

pub use config::StoreConfig;
pub use deps::Dependency;
pub use error::{StoreError, StoreResult};
pub use remote::RemoteSource;
pub use store::LocalStore;
