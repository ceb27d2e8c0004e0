use std::collections::BTreeMap;

use crate::engine::{MigrationReport, Migrator, MigratorConfig};
use crate::error::RegistryError;
use crate::record::Record;

/// Named document types, each with its own migration chain.
///
/// # Example
///
/// ```
/// use docshift::{Registry, Revision, Record};
/// use serde_json::json;
///
/// let mut registry = Registry::new();
/// registry
///     .add("cricket")
///     .unwrap()
///     .register_revision(Revision::new(1).add("foo", "bar"))
///     .unwrap();
///
/// let mut cricket = Record::new();
/// registry.migrate("cricket", &mut cricket).unwrap();
/// assert_eq!(cricket["foo"], json!("bar"));
///
/// assert!(registry.migrate("grasshopper", &mut Record::new()).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    types: BTreeMap<String, Migrator>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document type with the default configuration.
    pub fn add(&mut self, name: impl Into<String>) -> Result<&mut Migrator, RegistryError> {
        self.add_with_config(name, MigratorConfig::default())
    }

    /// Add a document type with its own configuration.
    pub fn add_with_config(
        &mut self,
        name: impl Into<String>,
        config: MigratorConfig,
    ) -> Result<&mut Migrator, RegistryError> {
        let name = name.into();
        if self.types.contains_key(&name) {
            return Err(RegistryError::DuplicateType(name));
        }
        Ok(self
            .types
            .entry(name)
            .or_insert_with(|| Migrator::with_config(config)))
    }

    /// Look up the migrator for a document type.
    pub fn get(&self, name: &str) -> Result<&Migrator, RegistryError> {
        self.types
            .get(name)
            .ok_or_else(|| RegistryError::UnknownType(name.to_string()))
    }

    /// Look up the migrator for a document type, for registering more steps.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Migrator, RegistryError> {
        self.types
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnknownType(name.to_string()))
    }

    /// Whether a document type is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Migrate a record of type `name` to its latest version.
    pub fn migrate(
        &self,
        name: &str,
        record: &mut Record,
    ) -> Result<MigrationReport, RegistryError> {
        Ok(self.get(name)?.migrate(record)?)
    }

    /// Stamp a new record of type `name` with its latest version.
    pub fn tag(&self, name: &str, record: &mut Record) -> Result<bool, RegistryError> {
        Ok(self.get(name)?.tag(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use crate::step::{MigrationStep, Revision};
    use serde_json::{json, Value};

    #[test]
    fn duplicate_type() {
        let mut registry = Registry::new();
        registry.add("test1").unwrap();
        let err = registry.add("test1").unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateType(ref n) if n == "test1"));
    }

    #[test]
    fn unknown_type() {
        let registry = Registry::new();
        let err = registry.get("nope").unwrap_err();
        assert_eq!(err.to_string(), "document type 'nope' is not registered");
    }

    #[test]
    fn types_are_independent() {
        let mut registry = Registry::new();
        registry
            .add("a")
            .unwrap()
            .register(MigrationStep::add(1, "kind", "a"))
            .unwrap();
        let b = registry.add("b").unwrap();
        b.register(MigrationStep::add(1, "kind", "b")).unwrap();
        b.register(MigrationStep::add(2, "extra", true)).unwrap();

        let mut ra = Record::new();
        let mut rb = Record::new();
        registry.migrate("a", &mut ra).unwrap();
        registry.migrate("b", &mut rb).unwrap();

        assert_eq!(Value::Object(ra), json!({"kind": "a", "_version": 1}));
        assert_eq!(
            Value::Object(rb),
            json!({"kind": "b", "extra": true, "_version": 2})
        );
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn incremental_revisions_over_time() {
        let mut registry = Registry::new();
        registry.add("test1").unwrap();
        let mut o = Record::new();

        let m = registry.get_mut("test1").unwrap();
        let v = m.next_version().unwrap();
        m.register_revision(Revision::new(v).add("a", "a").add("b", "b"))
            .unwrap();
        registry.migrate("test1", &mut o).unwrap();
        assert_eq!(o["a"], json!("a"));
        assert_eq!(o["b"], json!("b"));

        let m = registry.get_mut("test1").unwrap();
        let v = m.next_version().unwrap();
        m.register_revision(Revision::new(v).rename("a", "c")).unwrap();
        registry.migrate("test1", &mut o).unwrap();
        assert!(!o.contains_key("a"));
        assert_eq!(o["c"], json!("a"));

        let m = registry.get_mut("test1").unwrap();
        let v = m.next_version().unwrap();
        m.register_revision(Revision::new(v).remove("b")).unwrap();
        registry.migrate("test1", &mut o).unwrap();
        assert!(!o.contains_key("b"));

        let m = registry.get_mut("test1").unwrap();
        let v = m.next_version().unwrap();
        m.register_revision(Revision::new(v).map("c", |c| {
            let s = c.as_str().unwrap_or_default();
            json!(format!("{s}{s}"))
        }))
        .unwrap();
        registry.migrate("test1", &mut o).unwrap();
        assert_eq!(o["c"], json!("aa"));
        assert_eq!(o["_version"], json!(4));
    }

    #[test]
    fn migrate_error_passes_through() {
        let mut registry = Registry::new();
        registry.add("t").unwrap();
        let mut r = Record::new();
        r.insert("_version".into(), json!("x"));
        let err = registry.migrate("t", &mut r).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Migrate(MigrateError::InvalidVersionMarker { .. })
        ));
    }

    #[test]
    fn tag_by_name() {
        let mut registry = Registry::new();
        registry
            .add("t")
            .unwrap()
            .register(MigrationStep::add(3, "a", 1))
            .unwrap();
        let mut r = Record::new();
        assert!(registry.tag("t", &mut r).unwrap());
        assert_eq!(r["_version"], json!(3));
        assert!(registry.tag("missing", &mut r).is_err());
    }
}
