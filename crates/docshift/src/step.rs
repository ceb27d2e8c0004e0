use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::BoxError;

/// A stored value transform: old value in, new value out, may fail.
///
/// Transforms must be pure. Two runs over the same input must produce the
/// same output, otherwise migrations stop being deterministic.
pub type TransformFn = Arc<dyn Fn(&Value) -> Result<Value, BoxError> + Send + Sync>;

/// The operation a [`MigrationStep`] performs on a record.
#[derive(Clone)]
pub enum StepOp {
    /// Insert `key` with `default` unless the key is already present.
    Add { key: String, default: Value },
    /// Delete `key` if present.
    Remove { key: String },
    /// Move the value of `from` to `to`, overwriting `to`.
    Rename { from: String, to: String },
    /// Replace the value of `key` with `function(value)`.
    Transform { key: String, function: TransformFn },
}

/// Discriminant of a [`StepOp`], for listings and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Add,
    Remove,
    Rename,
    Transform,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Rename => "rename",
            Self::Transform => "transform",
        };
        f.write_str(name)
    }
}

impl StepOp {
    /// The kind of this operation.
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Add { .. } => StepKind::Add,
            Self::Remove { .. } => StepKind::Remove,
            Self::Rename { .. } => StepKind::Rename,
            Self::Transform { .. } => StepKind::Transform,
        }
    }

    /// The key this operation reads. For a rename, the source key.
    pub fn key(&self) -> &str {
        match self {
            Self::Add { key, .. } | Self::Remove { key } | Self::Transform { key, .. } => key,
            Self::Rename { from, .. } => from,
        }
    }
}

impl fmt::Debug for StepOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { key, default } => f
                .debug_struct("Add")
                .field("key", key)
                .field("default", default)
                .finish(),
            Self::Remove { key } => f.debug_struct("Remove").field("key", key).finish(),
            Self::Rename { from, to } => f
                .debug_struct("Rename")
                .field("from", from)
                .field("to", to)
                .finish(),
            Self::Transform { key, .. } => f
                .debug_struct("Transform")
                .field("key", key)
                .finish_non_exhaustive(),
        }
    }
}

/// One versioned transformation of a record.
///
/// Steps are immutable once built. Cloning is cheap: transform functions are
/// shared behind an [`Arc`].
#[derive(Debug, Clone)]
pub struct MigrationStep {
    version: u32,
    op: StepOp,
}

impl MigrationStep {
    /// Create a step from an explicit operation.
    pub fn new(version: u32, op: StepOp) -> Self {
        Self { version, op }
    }

    /// `add(key, default)` at `version`.
    pub fn add(version: u32, key: impl Into<String>, default: impl Into<Value>) -> Self {
        Self::new(
            version,
            StepOp::Add {
                key: key.into(),
                default: default.into(),
            },
        )
    }

    /// `remove(key)` at `version`.
    pub fn remove(version: u32, key: impl Into<String>) -> Self {
        Self::new(version, StepOp::Remove { key: key.into() })
    }

    /// `rename(from, to)` at `version`.
    pub fn rename(version: u32, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(
            version,
            StepOp::Rename {
                from: from.into(),
                to: to.into(),
            },
        )
    }

    /// `transform(key, function)` at `version` with a fallible function.
    pub fn transform<F>(version: u32, key: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::new(
            version,
            StepOp::Transform {
                key: key.into(),
                function: Arc::new(function),
            },
        )
    }

    /// `transform(key, function)` at `version` with a function that cannot fail.
    pub fn map<F>(version: u32, key: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Self::transform(version, key, move |value| Ok(function(value)))
    }

    /// Version this step belongs to.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The operation performed.
    pub fn op(&self) -> &StepOp {
        &self.op
    }

    /// Shorthand for `self.op().kind()`.
    pub fn kind(&self) -> StepKind {
        self.op.kind()
    }
}

/// Several operations grouped under one version, built by chaining.
///
/// Operations apply in the order they were chained.
///
/// # Example
///
/// ```
/// use docshift::{Migrator, Revision};
///
/// let mut migrator = Migrator::new();
/// migrator
///     .register_revision(
///         Revision::new(1)
///             .rename("foo", "baz")
///             .add("color", "green")
///             .add("legs", 6),
///     )
///     .unwrap();
///
/// assert_eq!(migrator.latest_version(), 1);
/// assert_eq!(migrator.registered_steps().len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct Revision {
    version: u32,
    steps: Vec<MigrationStep>,
}

impl Revision {
    /// Start an empty revision for `version`.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            steps: Vec::new(),
        }
    }

    /// Version every chained operation is registered at.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Chain an `add`.
    pub fn add(mut self, key: impl Into<String>, default: impl Into<Value>) -> Self {
        self.steps.push(MigrationStep::add(self.version, key, default));
        self
    }

    /// Chain a `remove`.
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.steps.push(MigrationStep::remove(self.version, key));
        self
    }

    /// Chain a `rename`.
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.steps.push(MigrationStep::rename(self.version, from, to));
        self
    }

    /// Chain a fallible `transform`.
    pub fn transform<F>(mut self, key: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.steps
            .push(MigrationStep::transform(self.version, key, function));
        self
    }

    /// Chain an infallible `transform`.
    pub fn map<F>(mut self, key: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.steps.push(MigrationStep::map(self.version, key, function));
        self
    }

    /// Number of chained operations.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when nothing has been chained.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The chained steps, in order.
    pub fn into_steps(self) -> Vec<MigrationStep> {
        self.steps
    }
}
