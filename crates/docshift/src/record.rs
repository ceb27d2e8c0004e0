use serde_json::{Map, Value};

use crate::error::MigrateError;

/// A schemaless document: string keys to JSON values.
pub type Record = Map<String, Value>;

/// Default key under which a record stores its version marker.
pub const DEFAULT_VERSION_KEY: &str = "_version";

/// Version of a record that carries no marker.
pub const UNVERSIONED: u32 = 0;

/// Read the version marker stored under `key`.
///
/// A missing marker means the record predates every migration and reads as
/// [`UNVERSIONED`].
///
/// # Example
///
/// ```
/// use docshift::{peek_version, Record};
/// use serde_json::json;
///
/// let record: Record = serde_json::from_value(json!({"_version": 3})).unwrap();
/// assert_eq!(peek_version(&record, "_version").unwrap(), 3);
///
/// let fresh = Record::new();
/// assert_eq!(peek_version(&fresh, "_version").unwrap(), 0);
/// ```
pub fn peek_version(record: &Record, key: &str) -> Result<u32, MigrateError> {
    match record.get(key) {
        None => Ok(UNVERSIONED),
        Some(value) => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| MigrateError::InvalidVersionMarker {
                key: key.to_string(),
                found: value.clone(),
            }),
    }
}

/// Write `version` as the record's marker, replacing any previous value.
pub fn stamp_version(record: &mut Record, key: &str, version: u32) {
    record.insert(key.to_string(), Value::from(version));
}

/// Check whether the record carries a marker under `key`.
pub fn is_versioned(record: &Record, key: &str) -> bool {
    record.contains_key(key)
}
