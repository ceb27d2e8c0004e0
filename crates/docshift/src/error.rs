use std::error::Error;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::record::Record;

/// Boxed error returned by transform functions.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Error during step registration or migration.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// A step was registered for a version that is already taken and the
    /// migrator rejects duplicates.
    #[error("a migration step for v{version} is already registered")]
    DuplicateVersion { version: u32 },

    /// A step was rejected at registration time.
    #[error("invalid migration step for v{version}: {reason}")]
    InvalidStep { version: u32, reason: String },

    /// A transform function failed.
    #[error("transform of `{key}` failed at v{version} (step {index}): {source}")]
    Transform {
        version: u32,
        /// Position of the failing step within its version.
        index: usize,
        key: String,
        #[source]
        source: BoxError,
    },

    /// The requested target cannot be reached from the record's version.
    #[error("cannot migrate from v{current} to v{target} (latest registered: v{latest})")]
    UnknownVersion { current: u32, target: u32, latest: u32 },

    /// The record was written by a newer migration list than this one.
    #[error("record version v{found} is newer than latest v{latest}")]
    FutureVersion { found: u32, latest: u32 },

    /// The version sequence skips a version the configuration requires.
    #[error("missing migration for v{missing}")]
    GapInChain { missing: u32 },

    /// The version marker is present but not a `u32`.
    #[error("version marker `{key}` holds {found}, expected a non-negative integer")]
    InvalidVersionMarker { key: String, found: Value },
}

/// A failed by-value migration.
///
/// Steps applied before the failure are not rolled back: `record` holds the
/// partially migrated document with its marker at the last fully applied
/// version.
#[derive(Debug)]
pub struct PartialMigration {
    /// The partially migrated record.
    pub record: Record,
    /// Why the migration stopped.
    pub error: MigrateError,
}

impl PartialMigration {
    /// Split into the partial record and the error.
    pub fn into_parts(self) -> (Record, MigrateError) {
        (self.record, self.error)
    }
}

impl fmt::Display for PartialMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "migration stopped part-way: {}", self.error)
    }
}

impl Error for PartialMigration {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Error from a [`Registry`](crate::Registry) of named document types.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The document type was already added.
    #[error("document type '{0}' is already registered")]
    DuplicateType(String),

    /// The document type was never added.
    #[error("document type '{0}' is not registered")]
    UnknownType(String),

    /// Migration of a record of a known type failed.
    #[error(transparent)]
    Migrate(#[from] MigrateError),
}
