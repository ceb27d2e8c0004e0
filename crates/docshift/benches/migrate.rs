use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docshift::{MigrationStep, Migrator, Record, Revision};
use serde_json::json;

fn wide_record(fields: usize) -> Record {
    (0..fields)
        .map(|i| (format!("field_{i}"), json!(format!("value-{i}"))))
        .collect()
}

fn bench_add_chain(c: &mut Criterion) {
    let mut migrator = Migrator::new();
    for v in 1..=100 {
        migrator
            .register(MigrationStep::add(v, format!("added_{v}"), v))
            .unwrap();
    }

    c.bench_function("Migrator::migrate 100 adds", |b| {
        b.iter(|| {
            let mut record = Record::new();
            migrator.migrate(&mut record).unwrap();
            black_box(record.len())
        })
    });
}

fn bench_rename_wide_record(c: &mut Criterion) {
    let mut migrator = Migrator::new();
    let mut revision = Revision::new(1);
    for i in 0..100 {
        revision = revision.rename(format!("field_{i}"), format!("renamed_{i}"));
    }
    migrator.register_revision(revision).unwrap();
    let record = wide_record(100);

    c.bench_function("Migrator::migrate 100 renames on 100 fields", |b| {
        b.iter(|| {
            let mut r = record.clone();
            migrator.migrate(&mut r).unwrap();
            black_box(r.len())
        })
    });
}

fn bench_transform(c: &mut Criterion) {
    let mut migrator = Migrator::new();
    for v in 1..=50 {
        migrator
            .register(MigrationStep::map(v, "counter", |n| {
                json!(n.as_i64().unwrap_or(0) + 1)
            }))
            .unwrap();
    }

    c.bench_function("Migrator::migrate 50 transforms", |b| {
        b.iter(|| {
            let mut r = Record::new();
            r.insert("counter".into(), json!(0));
            migrator.migrate(&mut r).unwrap();
            black_box(r["counter"].as_i64())
        })
    });

    // Partial chain: only the last 5 versions apply.
    c.bench_function("Migrator::migrate 5 of 50 transforms", |b| {
        b.iter(|| {
            let mut r = Record::new();
            r.insert("counter".into(), json!(0));
            r.insert("_version".into(), json!(45));
            migrator.migrate(&mut r).unwrap();
            black_box(r["counter"].as_i64())
        })
    });
}

fn bench_up_to_date(c: &mut Criterion) {
    let mut migrator = Migrator::new();
    for v in 1..=100 {
        migrator
            .register(MigrationStep::remove(v, format!("field_{v}")))
            .unwrap();
    }
    let mut record = wide_record(10);
    migrator.migrate(&mut record).unwrap();

    c.bench_function("Migrator::migrate already current", |b| {
        b.iter(|| {
            let mut r = record.clone();
            black_box(migrator.migrate(&mut r).unwrap().steps_applied)
        })
    });
}

criterion_group!(
    benches,
    bench_add_chain,
    bench_rename_wide_record,
    bench_transform,
    bench_up_to_date,
);
criterion_main!(benches);
