//! Registry invariant violations.

use crate::catalog::VersionNumber;
use thiserror::Error;

/// A schema registry that violates a build-time invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// Versions are not strictly increasing.
    #[error("schema version {version} does not follow {previous}")]
    NonIncreasingVersion {
        /// The preceding version.
        previous: VersionNumber,
        /// The offending version.
        version: VersionNumber,
    },

    /// Two versions share a structural checksum.
    #[error("schema versions {first} and {second} share structural checksum {checksum}")]
    DuplicateChecksum {
        /// The earlier version.
        first: VersionNumber,
        /// The later version.
        second: VersionNumber,
        /// Short hex form of the shared checksum.
        checksum: String,
    },

    /// A recorded change does not apply to the shape it is replayed against.
    #[error("change '{change}' in version {version} does not apply: {reason}")]
    InvalidChange {
        /// Version whose step holds the change.
        version: VersionNumber,
        /// Description of the change.
        change: String,
        /// Why it does not apply.
        reason: String,
    },

    /// A local-only entity would leave the local tier.
    #[error("local-only entity '{entity}' is not pinned at version {version}")]
    PrivacyRegression {
        /// Entity name.
        entity: String,
        /// First version where the pin is violated.
        version: VersionNumber,
    },
}
