//! Declarative migration plans loaded from TOML.
//!
//! A plan carries a [`MigratorConfig`] and lists of forward (`[[step]]`) and
//! inverse (`[[down]]`) steps. Transforms cannot be arbitrary closures in a
//! file, so plan transforms name one of the [`BUILTIN_FUNCTIONS`].
//!
//! ```toml
//! [config]
//! version_key = "_version"
//!
//! [[step]]
//! version = 1
//! op = "add"
//! key = "active"
//! value = true
//!
//! [[step]]
//! version = 2
//! op = "transform"
//! key = "email"
//! function = "lowercase"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::engine::{Migrator, MigratorConfig};
use crate::error::{BoxError, MigrateError};
use crate::step::{MigrationStep, StepOp};

/// Signature of a built-in transform.
pub type BuiltinFn = fn(&Value) -> Result<Value, BoxError>;

/// Transforms a plan may reference by name.
pub const BUILTIN_FUNCTIONS: &[(&str, BuiltinFn)] = &[
    ("lowercase", lowercase),
    ("uppercase", uppercase),
    ("trim", trim),
    ("to_string", to_string),
    ("to_number", to_number),
    ("wrap_array", wrap_array),
    ("negate", negate),
];

/// Look up a built-in transform by name.
pub fn lookup_function(name: &str) -> Option<BuiltinFn> {
    BUILTIN_FUNCTIONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, f)| *f)
}

/// Error loading or building a plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan file could not be read.
    #[error("failed to read plan {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The plan is not valid TOML or does not match the plan layout.
    #[error("failed to parse plan: {0}")]
    Parse(#[from] toml::de::Error),

    /// A transform names a function that is not built in.
    #[error("unknown transform function '{name}' at v{version}")]
    UnknownFunction { version: u32, name: String },

    /// A step was rejected by the migrator.
    #[error(transparent)]
    Register(#[from] MigrateError),
}

/// Top-level plan file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Plan {
    /// Migrator configuration.
    #[serde(default)]
    pub config: MigratorConfig,
    /// Forward steps, in registration order.
    #[serde(default, rename = "step")]
    pub steps: Vec<PlanStep>,
    /// Inverse steps, in registration order.
    #[serde(default, rename = "down")]
    pub inverse: Vec<PlanStep>,
}

/// One step as written in a plan.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanStep {
    /// Version the step belongs to.
    pub version: u32,
    /// What the step does.
    #[serde(flatten)]
    pub op: PlanOp,
}

/// Step operations expressible in a plan.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PlanOp {
    Add { key: String, value: Value },
    Remove { key: String },
    Rename { from: String, to: String },
    Transform { key: String, function: String },
}

impl Plan {
    /// Parse a plan from TOML text.
    pub fn from_toml_str(source: &str) -> Result<Self, PlanError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a plan file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Build a migrator holding every step of the plan, then validate it.
    pub fn build(&self) -> Result<Migrator, PlanError> {
        let mut migrator = Migrator::with_config(self.config.clone());
        for step in &self.steps {
            migrator.register(step.to_step()?)?;
        }
        for step in &self.inverse {
            migrator.register_inverse(step.to_step()?)?;
        }
        migrator.validate()?;
        Ok(migrator)
    }
}

impl PlanStep {
    /// Resolve into a [`MigrationStep`], looking up named transforms.
    pub fn to_step(&self) -> Result<MigrationStep, PlanError> {
        let version = self.version;
        let step = match &self.op {
            PlanOp::Add { key, value } => MigrationStep::add(version, key.as_str(), value.clone()),
            PlanOp::Remove { key } => MigrationStep::remove(version, key.as_str()),
            PlanOp::Rename { from, to } => {
                MigrationStep::rename(version, from.as_str(), to.as_str())
            }
            PlanOp::Transform { key, function } => {
                let f = lookup_function(function).ok_or_else(|| PlanError::UnknownFunction {
                    version,
                    name: function.clone(),
                })?;
                MigrationStep::new(
                    version,
                    StepOp::Transform {
                        key: key.clone(),
                        function: Arc::new(f),
                    },
                )
            }
        };
        Ok(step)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expect_str(value: &Value) -> Result<&str, BoxError> {
    value
        .as_str()
        .ok_or_else(|| format!("expected a string, found {}", type_name(value)).into())
}

fn lowercase(value: &Value) -> Result<Value, BoxError> {
    Ok(Value::String(expect_str(value)?.to_lowercase()))
}

fn uppercase(value: &Value) -> Result<Value, BoxError> {
    Ok(Value::String(expect_str(value)?.to_uppercase()))
}

fn trim(value: &Value) -> Result<Value, BoxError> {
    Ok(Value::String(expect_str(value)?.trim().to_string()))
}

fn to_string(value: &Value) -> Result<Value, BoxError> {
    Ok(match value {
        Value::String(_) => value.clone(),
        other => Value::String(other.to_string()),
    })
}

fn to_number(value: &Value) -> Result<Value, BoxError> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::Bool(b) => Ok(Value::from(u8::from(*b))),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                return Ok(Value::from(n));
            }
            s.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("'{s}' is not a number").into())
        }
        other => Err(format!("cannot convert {} to a number", type_name(other)).into()),
    }
}

fn wrap_array(value: &Value) -> Result<Value, BoxError> {
    Ok(match value {
        Value::Array(_) => value.clone(),
        other => Value::Array(vec![other.clone()]),
    })
}

fn negate(value: &Value) -> Result<Value, BoxError> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64().and_then(i64::checked_neg) {
                Ok(Value::from(i))
            } else {
                n.as_f64()
                    .and_then(|f| serde_json::Number::from_f64(-f))
                    .map(Value::Number)
                    .ok_or_else(|| format!("cannot negate {n}").into())
            }
        }
        other => Err(format!("cannot negate {}", type_name(other)).into()),
    }
}
