//! Platform variant codec for the kiln resource pipeline.
//!
//! A resource value can be narrowed to a target platform variant: a
//! combination of platform, architecture, render API group, render API,
//! quality level and a custom dimension. The variant is packed into a
//! single `u64` ([`Platform`]) so it can live in change records, file
//! names and wire messages.
//!
//! Two relations drive variant resolution:
//!
//! - the specificity partial order
//!   ([`Platform::is_equal_or_more_specific`]), used to find the most
//!   specific stored value compatible with a request, and
//! - gradual reduction ([`Platform::reduce`]), stepping from most
//!   specific to least specific until the full wildcard is reached, used
//!   for fallback lookups of compiled artifacts.

pub mod error;
pub mod parse;
pub mod spec;

pub use error::PlatformError;
pub use spec::{Platform, PlatformDeclaration};
