use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included};

use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::error::{BoxError, MigrateError, PartialMigration};
use crate::record::{
    is_versioned, peek_version, stamp_version, Record, DEFAULT_VERSION_KEY, UNVERSIONED,
};
use crate::step::{MigrationStep, Revision, StepKind, StepOp};

/// What to do when a second step is registered for a version that already
/// has steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Append after the existing steps. Steps of one version run in
    /// registration order.
    #[default]
    Append,
    /// Fail with [`MigrateError::DuplicateVersion`].
    Reject,
}

/// Configuration for the migrator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Record key holding the version marker.
    pub version_key: String,
    /// Policy for several registrations at one version.
    pub duplicates: DuplicatePolicy,
    /// If false, migrating to a version below the record's own fails with
    /// [`MigrateError::UnknownVersion`] instead of running inverse steps.
    /// When true, every forward version being undone still needs inverse
    /// steps registered for it (an empty inverse revision marks a version
    /// that needs no undoing).
    pub allow_downgrade: bool,
    /// If true, [`Migrator::validate`] reports gaps in the version sequence.
    /// Gaps never affect migration itself; missing versions are skipped.
    pub require_contiguous: bool,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            version_key: DEFAULT_VERSION_KEY.to_string(),
            duplicates: DuplicatePolicy::Append,
            allow_downgrade: true,
            require_contiguous: false,
        }
    }
}

/// Summary of a successful migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version the record was at before the call.
    pub from: u32,
    /// Version the record is at now.
    pub to: u32,
    /// Number of steps that ran, no-ops included.
    pub steps_applied: usize,
}

impl MigrationReport {
    /// True when the record was already at the target version.
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Applies an ordered list of versioned steps to records.
///
/// Steps are kept sorted by version; steps of the same version keep their
/// registration order. When a record at version N needs to reach version M
/// (N < M), every step with version in `(N, M]` runs in that order. Going
/// the other way runs caller-supplied inverse steps in reverse version order.
///
/// # Example
///
/// ```
/// use docshift::{MigrationStep, Migrator, Record};
/// use serde_json::json;
///
/// let mut migrator = Migrator::new();
/// migrator.register(MigrationStep::add(1, "active", true)).unwrap();
/// migrator.register(MigrationStep::rename(2, "name", "full_name")).unwrap();
///
/// let mut record: Record = serde_json::from_value(json!({"name": "Bob"})).unwrap();
/// migrator.migrate(&mut record).unwrap();
///
/// assert_eq!(
///     serde_json::Value::Object(record),
///     json!({"full_name": "Bob", "active": true, "_version": 2})
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct Migrator {
    config: MigratorConfig,
    up: BTreeMap<u32, Vec<MigrationStep>>,
    down: BTreeMap<u32, Vec<MigrationStep>>,
}

impl Migrator {
    /// Create an empty migrator with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty migrator with `config`.
    pub fn with_config(config: MigratorConfig) -> Self {
        Self {
            config,
            up: BTreeMap::new(),
            down: BTreeMap::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Register a forward step.
    pub fn register(&mut self, step: MigrationStep) -> Result<(), MigrateError> {
        self.check_step(&step)?;
        let version = step.version();
        insert_steps(&mut self.up, self.config.duplicates, version, vec![step])
    }

    /// Register every operation of a revision, or none of them if any is
    /// invalid.
    ///
    /// An empty revision still claims its version, so records migrated past
    /// it are stamped with it.
    pub fn register_revision(&mut self, revision: Revision) -> Result<(), MigrateError> {
        let version = revision.version();
        let steps = self.check_revision(revision)?;
        insert_steps(&mut self.up, self.config.duplicates, version, steps)
    }

    /// Register an inverse step. An inverse step at version `v` undoes what
    /// the forward steps of `v` did.
    pub fn register_inverse(&mut self, step: MigrationStep) -> Result<(), MigrateError> {
        self.check_step(&step)?;
        let version = step.version();
        insert_steps(&mut self.down, self.config.duplicates, version, vec![step])
    }

    /// Register a whole revision of inverse steps.
    pub fn register_inverse_revision(&mut self, revision: Revision) -> Result<(), MigrateError> {
        let version = revision.version();
        let steps = self.check_revision(revision)?;
        insert_steps(&mut self.down, self.config.duplicates, version, steps)
    }

    /// Whether every forward version in `(target, current]` has inverse steps.
    fn can_undo(&self, target: u32, current: u32) -> bool {
        self.up
            .range((Excluded(target), Included(current)))
            .all(|(version, _)| self.down.contains_key(version))
    }

    /// Highest registered forward version, or 0 when nothing is registered.
    pub fn latest_version(&self) -> u32 {
        self.up.keys().next_back().copied().unwrap_or(UNVERSIONED)
    }

    /// The version a new revision should use to land after every existing one.
    ///
    /// Returns `None` once `u32::MAX` is registered.
    pub fn next_version(&self) -> Option<u32> {
        self.latest_version().checked_add(1)
    }

    /// Read a record's version marker.
    pub fn version_of(&self, record: &Record) -> Result<u32, MigrateError> {
        peek_version(record, &self.config.version_key)
    }

    /// Check whether a record is behind the latest version.
    pub fn needs_migration(&self, record: &Record) -> Result<bool, MigrateError> {
        Ok(self.version_of(record)? < self.latest_version())
    }

    /// List forward steps as `(version, kind)` pairs in application order.
    pub fn registered_steps(&self) -> Vec<(u32, StepKind)> {
        list_steps(&self.up)
    }

    /// List inverse steps as `(version, kind)` pairs, ascending by version.
    pub fn registered_inverse_steps(&self) -> Vec<(u32, StepKind)> {
        list_steps(&self.down)
    }

    /// Validate that the version sequence is complete from 1 to latest, if
    /// the configuration asks for contiguous versions.
    pub fn validate(&self) -> Result<(), MigrateError> {
        if !self.config.require_contiguous {
            return Ok(());
        }
        let mut expected = 1;
        for &version in self.up.keys() {
            if version != expected {
                return Err(MigrateError::GapInChain { missing: expected });
            }
            expected += 1;
        }
        Ok(())
    }

    /// Stamp a newly created record with the latest version.
    ///
    /// New documents are built in the current shape, so they must not go
    /// through migrations written for older ones. Records that already carry
    /// a marker are left alone. Returns true if the record was stamped.
    pub fn tag(&self, record: &mut Record) -> bool {
        if is_versioned(record, &self.config.version_key) {
            return false;
        }
        stamp_version(record, &self.config.version_key, self.latest_version());
        true
    }

    /// Migrate a record in place to the latest version.
    pub fn migrate(&self, record: &mut Record) -> Result<MigrationReport, MigrateError> {
        self.migrate_to(record, self.latest_version())
    }

    /// Migrate a record in place to `target`.
    ///
    /// On failure the steps applied so far stay applied, and the marker names
    /// the last version whose steps all succeeded.
    pub fn migrate_to(
        &self,
        record: &mut Record,
        target: u32,
    ) -> Result<MigrationReport, MigrateError> {
        let key = self.config.version_key.as_str();
        let current = peek_version(record, key)?;
        let latest = self.latest_version();

        if current > latest {
            return Err(MigrateError::FutureVersion {
                found: current,
                latest,
            });
        }
        let downgrade_blocked =
            target < current && !(self.config.allow_downgrade && self.can_undo(target, current));
        if target > latest || downgrade_blocked {
            return Err(MigrateError::UnknownVersion {
                current,
                target,
                latest,
            });
        }

        let mut applied = 0;

        if current < target {
            for (&version, steps) in self.up.range((Excluded(current), Included(target))) {
                applied += apply_version(record, version, steps)?;
                stamp_version(record, key, version);
            }
        } else if current > target {
            for (&version, steps) in self.down.range((Excluded(target), Included(current))).rev() {
                applied += apply_version(record, version, steps)?;
                stamp_version(record, key, self.previous_version(version).max(target));
            }
        }

        stamp_version(record, key, target);

        debug!(from = current, to = target, steps = applied, "migrated record");

        Ok(MigrationReport {
            from: current,
            to: target,
            steps_applied: applied,
        })
    }

    /// Migrate an owned record to the latest version.
    pub fn migrate_owned(&self, record: Record) -> Result<Record, PartialMigration> {
        self.migrate_owned_to(record, self.latest_version())
    }

    /// Migrate an owned record to `target`, handing the partially migrated
    /// record back with the error on failure.
    pub fn migrate_owned_to(
        &self,
        mut record: Record,
        target: u32,
    ) -> Result<Record, PartialMigration> {
        match self.migrate_to(&mut record, target) {
            Ok(_) => Ok(record),
            Err(error) => Err(PartialMigration { record, error }),
        }
    }

    /// Highest forward version below `version`.
    fn previous_version(&self, version: u32) -> u32 {
        self.up
            .range(..version)
            .next_back()
            .map(|(&v, _)| v)
            .unwrap_or(UNVERSIONED)
    }

    fn check_step(&self, step: &MigrationStep) -> Result<(), MigrateError> {
        let version = step.version();
        let invalid = |reason: String| MigrateError::InvalidStep { version, reason };

        if version == UNVERSIONED {
            return Err(invalid("version 0 is reserved for unversioned records".into()));
        }

        let marker = self.config.version_key.as_str();
        match step.op() {
            StepOp::Rename { from, to } if from == to => {
                Err(invalid(format!("attempting to rename `{from}` to the same name")))
            }
            StepOp::Rename { from, to } if from == marker || to == marker => {
                Err(invalid(format!("step touches the version marker `{marker}`")))
            }
            op if op.key() == marker => {
                Err(invalid(format!("step touches the version marker `{marker}`")))
            }
            _ => Ok(()),
        }
    }

    fn check_revision(&self, revision: Revision) -> Result<Vec<MigrationStep>, MigrateError> {
        let version = revision.version();
        if version == UNVERSIONED {
            return Err(MigrateError::InvalidStep {
                version,
                reason: "version 0 is reserved for unversioned records".into(),
            });
        }
        let steps = revision.into_steps();
        for step in &steps {
            self.check_step(step)?;
        }
        Ok(steps)
    }
}

fn insert_steps(
    map: &mut BTreeMap<u32, Vec<MigrationStep>>,
    policy: DuplicatePolicy,
    version: u32,
    steps: Vec<MigrationStep>,
) -> Result<(), MigrateError> {
    if policy == DuplicatePolicy::Reject && map.contains_key(&version) {
        return Err(MigrateError::DuplicateVersion { version });
    }
    map.entry(version).or_default().extend(steps);
    Ok(())
}

fn list_steps(map: &BTreeMap<u32, Vec<MigrationStep>>) -> Vec<(u32, StepKind)> {
    map.iter()
        .flat_map(|(&version, steps)| steps.iter().map(move |s| (version, s.kind())))
        .collect()
}

/// Run the steps of one version in order. Returns how many ran.
fn apply_version(
    record: &mut Record,
    version: u32,
    steps: &[MigrationStep],
) -> Result<usize, MigrateError> {
    for (index, step) in steps.iter().enumerate() {
        apply_op(record, step.op()).map_err(|source| {
            warn!(version, index, key = step.op().key(), error = %source, "migration step failed");
            MigrateError::Transform {
                version,
                index,
                key: step.op().key().to_string(),
                source,
            }
        })?;
        trace!(version, index, kind = %step.kind(), key = step.op().key(), "applied step");
    }
    Ok(steps.len())
}

fn apply_op(record: &mut Record, op: &StepOp) -> Result<(), BoxError> {
    match op {
        StepOp::Add { key, default } => {
            if !record.contains_key(key) {
                record.insert(key.clone(), default.clone());
            }
        }
        StepOp::Remove { key } => {
            record.remove(key);
        }
        StepOp::Rename { from, to } => {
            if let Some(value) = record.remove(from) {
                record.insert(to.clone(), value);
            }
        }
        StepOp::Transform { key, function } => {
            if let Some(slot) = record.get_mut(key) {
                *slot = function(slot)?;
            }
        }
    }
    Ok(())
}
