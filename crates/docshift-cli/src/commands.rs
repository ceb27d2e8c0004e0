use std::cmp::Reverse;
use std::fs;
use std::io::{self, Read};

use docshift::plan::{Plan, PlanOp, PlanStep};
use docshift::{Migrator, Record};
use serde_json::Value;
use tracing::info;

type Result<T = ()> = std::result::Result<T, Box<dyn std::error::Error>>;

const STDIN: &str = "<stdin>";

/// Documents read from one input, remembering whether they came as a single
/// object or an array so they are written back the same way.
#[derive(Debug)]
struct Documents {
    source: String,
    records: Vec<Record>,
    single: bool,
}

impl Documents {
    fn parse(source: &str, text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| format!("{source}: invalid JSON: {e}"))?;
        let (records, single) = match value {
            Value::Object(record) => (vec![record], true),
            Value::Array(items) => {
                let mut records = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        Value::Object(record) => records.push(record),
                        _ => return Err(format!("{source}[{i}]: not a JSON object").into()),
                    }
                }
                (records, false)
            }
            _ => return Err(format!("{source}: expected an object or an array of objects").into()),
        };
        Ok(Self {
            source: source.to_string(),
            records,
            single,
        })
    }

    fn into_value(self) -> Value {
        let mut records = self.records.into_iter().map(Value::Object);
        match (self.single, records.next()) {
            (true, Some(record)) => record,
            (_, first) => Value::Array(first.into_iter().chain(records).collect()),
        }
    }

    fn label(&self, index: usize) -> String {
        if self.single {
            self.source.clone()
        } else {
            format!("{}[{index}]", self.source)
        }
    }
}

fn read_inputs(files: &[String]) -> Result<Vec<Documents>> {
    if files.is_empty() {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        return Ok(vec![Documents::parse(STDIN, &text)?]);
    }
    files
        .iter()
        .map(|path| {
            let text = fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
            Documents::parse(path, &text)
        })
        .collect()
}

fn load_migrator(plan_path: &str) -> Result<Migrator> {
    Ok(Plan::load(plan_path)?.build()?)
}

/// Migrate every record of `docs` to `target`.
///
/// Stops at the first failure, printing the partially migrated record to
/// stderr so it can be inspected.
fn migrate_documents(migrator: &Migrator, docs: Documents, target: u32) -> Result<Documents> {
    let Documents {
        source,
        records,
        single,
    } = docs;
    let mut migrated = Documents {
        source,
        records: Vec::with_capacity(records.len()),
        single,
    };

    for (index, record) in records.into_iter().enumerate() {
        match migrator.migrate_owned_to(record, target) {
            Ok(record) => migrated.records.push(record),
            Err(partial) => {
                let label = migrated.label(index);
                let (record, error) = partial.into_parts();
                eprintln!("partially migrated record {label}:");
                eprintln!("{}", serde_json::to_string_pretty(&Value::Object(record))?);
                return Err(format!("{label}: {error}").into());
            }
        }
    }

    Ok(migrated)
}

/// `docshift migrate --plan <plan> [files]` — Migrate documents.
pub fn migrate(plan_path: &str, to: Option<u32>, in_place: bool, files: &[String]) -> Result {
    if in_place && files.is_empty() {
        return Err("--in-place needs at least one document file".into());
    }

    let migrator = load_migrator(plan_path)?;
    let target = to.unwrap_or_else(|| migrator.latest_version());

    for docs in read_inputs(files)? {
        let count = docs.records.len();
        let migrated = migrate_documents(&migrator, docs, target)?;
        let source = migrated.source.clone();
        let text = serde_json::to_string_pretty(&migrated.into_value())?;

        if in_place {
            fs::write(&source, format!("{text}\n"))?;
            info!(file = %source, records = count, target, "migrated in place");
        } else {
            println!("{text}");
        }
    }

    Ok(())
}

fn status_lines(migrator: &Migrator, docs: &Documents) -> Vec<String> {
    let latest = migrator.latest_version();
    docs.records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let label = docs.label(index);
            match migrator.version_of(record) {
                Ok(version) if version < latest => {
                    format!("  {label:<40} v{version:<6} needs migration to v{latest}")
                }
                Ok(version) if version > latest => {
                    format!("  {label:<40} v{version:<6} newer than plan (v{latest})")
                }
                Ok(version) => format!("  {label:<40} v{version:<6} up to date"),
                Err(e) => format!("  {label:<40} {e}"),
            }
        })
        .collect()
}

/// `docshift status --plan <plan> [files]` — Show document versions.
pub fn status(plan_path: &str, files: &[String]) -> Result {
    let migrator = load_migrator(plan_path)?;
    println!(
        "Plan: {plan_path} (latest v{}, marker \"{}\")",
        migrator.latest_version(),
        migrator.config().version_key
    );
    println!();

    for docs in read_inputs(files)? {
        for line in status_lines(&migrator, &docs) {
            println!("{line}");
        }
    }

    Ok(())
}

fn describe(step: &PlanStep) -> String {
    let detail = match &step.op {
        PlanOp::Add { key, value } => format!("{:<10} {key} = {value}", "add"),
        PlanOp::Remove { key } => format!("{:<10} {key}", "remove"),
        PlanOp::Rename { from, to } => format!("{:<10} {from} -> {to}", "rename"),
        PlanOp::Transform { key, function } => {
            format!("{:<10} {key} ({function})", "transform")
        }
    };
    format!("  v{:<6} {detail}", step.version)
}

/// `docshift steps --plan <plan>` — List the steps of a plan.
pub fn steps(plan_path: &str) -> Result {
    let plan = Plan::load(plan_path)?;
    let migrator = plan.build()?;

    println!(
        "Plan: {plan_path} (latest v{}, {} steps)",
        migrator.latest_version(),
        plan.steps.len()
    );

    if plan.steps.is_empty() {
        println!("  (no steps)");
    }
    for step in sorted(&plan.steps) {
        println!("{}", describe(step));
    }

    if !plan.inverse.is_empty() {
        println!();
        println!("Inverse steps:");
        for step in undo_order(&plan.inverse) {
            println!("{}", describe(step));
        }
    }

    Ok(())
}

/// Steps in the order the migrator applies them: by version, then as written.
fn sorted(steps: &[PlanStep]) -> Vec<&PlanStep> {
    let mut ordered: Vec<&PlanStep> = steps.iter().collect();
    ordered.sort_by_key(|s| s.version);
    ordered
}

/// Inverse steps in the order a downgrade applies them: newest version first,
/// steps of one version still as written.
fn undo_order(steps: &[PlanStep]) -> Vec<&PlanStep> {
    let mut ordered: Vec<&PlanStep> = steps.iter().collect();
    ordered.sort_by_key(|s| Reverse(s.version));
    ordered
}
