//! Schema version registry.
//!
//! One canonical set of current entity shapes plus a changelog of invertible
//! changes per version. Historical shapes are derived, never declared.

mod change;
mod error;
#[allow(clippy::module_inception)]
mod registry;

pub use change::SchemaChange;
pub use error::RegistryError;
pub use registry::{SchemaRegistry, VersionStep};
