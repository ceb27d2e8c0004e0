//! # docshift
//!
//! Ordered, versioned shape migrations for schemaless documents.
//!
//! Document stores do not enforce a schema, but the shape of the documents
//! they hold still changes over time. `docshift` lets you describe each change
//! once, as a versioned step, and brings any stored document up to date when
//! it is read.
//!
//! ## How It Works
//!
//! 1. Every document carries a **version marker** (`"_version"` by default).
//!    A document without one is at version 0.
//! 2. Steps are registered on a [`Migrator`], each at a version:
//!    `add`, `remove`, `rename` or `transform`.
//! 3. Migrating a document runs every step between its marker and the target
//!    version, then stamps the marker with the target.
//!
//! ## Key Concepts
//!
//! - **Deterministic**: the same steps over the same document give the same
//!   result.
//! - **Forgiving steps**: `add` leaves existing keys alone; `remove`, `rename`
//!   and `transform` skip documents that lack the key.
//! - **No rollback**: a failing step stops the migration. Steps already applied
//!   stay applied and the marker names the last version that fully succeeded.
//! - **Explicit state**: migrators are plain values. There is no global
//!   registry; use [`Registry`] to keep one chain per document type.
//!
//! ## Quick Start
//!
//! ```
//! use docshift::{Migrator, Record, Revision};
//! use serde_json::json;
//!
//! let mut migrator = Migrator::new();
//! migrator
//!     .register_revision(Revision::new(1).add("active", true))
//!     .unwrap();
//! migrator
//!     .register_revision(Revision::new(2).rename("name", "full_name"))
//!     .unwrap();
//!
//! let mut user: Record = serde_json::from_value(json!({"name": "Bob"})).unwrap();
//! migrator.migrate(&mut user).unwrap();
//!
//! assert_eq!(user["full_name"], json!("Bob"));
//! assert_eq!(user["active"], json!(true));
//! assert_eq!(user["_version"], json!(2));
//! ```

mod engine;
mod error;
mod record;
mod registry;
mod step;

#[cfg(feature = "plan")]
pub mod plan;

pub use engine::{DuplicatePolicy, MigrationReport, Migrator, MigratorConfig};
pub use error::{BoxError, MigrateError, PartialMigration, RegistryError};
pub use record::{
    is_versioned, peek_version, stamp_version, Record, DEFAULT_VERSION_KEY, UNVERSIONED,
};
pub use registry::Registry;
pub use step::{MigrationStep, Revision, StepKind, StepOp, TransformFn};

#[cfg(feature = "plan")]
pub use plan::{Plan, PlanError};
