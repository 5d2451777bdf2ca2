//! Benchmarks for the hot scoring and identity paths.

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mathesis::identity::concept_id;
use mathesis::scoring::ScoringConfig;

fn bench_concept_id(c: &mut Criterion) {
    c.bench_function("concept_id", |bench| {
        bench.iter(|| black_box(concept_id(black_box("Ownership and Borrowing"))))
    });
}

fn bench_brightness(c: &mut Criterion) {
    let scoring = ScoringConfig::default();
    let now = Utc::now();
    let last = Some(now - Duration::days(14));

    c.bench_function("brightness_14d", |bench| {
        bench.iter(|| black_box(scoring.brightness(black_box(last), now)))
    });
}

fn bench_update_mastery(c: &mut Criterion) {
    let scoring = ScoringConfig::default();

    c.bench_function("update_mastery", |bench| {
        bench.iter(|| black_box(scoring.update_mastery(black_box(Some(0.42)), black_box(85))))
    });
}

criterion_group!(benches, bench_concept_id, bench_brightness, bench_update_mastery);
criterion_main!(benches);
