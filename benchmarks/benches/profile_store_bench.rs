use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use benchmarks::generate_test_data;
use scavenger_core::profile::ProfileStore;

/// Benchmark a single registration against an already-warm store.
fn benchmark_register_single(c: &mut Criterion) {
    let store: ProfileStore<String> = ProfileStore::new();
    for obs in generate_test_data(20) {
        store.register("t".to_string(), obs.observed_complexity, Some(obs.input_complexity));
    }
    let sample = generate_test_data(1)[0];

    let mut group = c.benchmark_group("register_single");
    group.bench_function("warm_store", |b| {
        b.iter(|| {
            store.register(
                black_box("t".to_string()),
                black_box(sample.observed_complexity),
                black_box(Some(sample.input_complexity)),
            )
        });
    });
    group.finish();
}

/// Benchmark `get_complexity` lookup cost as bucket count grows, exercising
/// the binary-search nearest-bucket path.
fn benchmark_lookup_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_scaling");
    for bucket_count in [10usize, 100, 1_000] {
        let store: ProfileStore<String> = ProfileStore::new();
        for obs in generate_test_data(bucket_count) {
            store.register("t".to_string(), obs.observed_complexity, Some(obs.input_complexity));
        }
        let probe = generate_test_data(1)[0].input_complexity;

        group.bench_with_input(BenchmarkId::new("get_complexity", bucket_count), &bucket_count, |b, _| {
            b.iter(|| store.get_complexity(black_box(&"t".to_string()), 0.0, black_box(Some(probe))));
        });
    }
    group.finish();
}

/// Benchmark a full save/load round trip at increasing store sizes.
fn benchmark_persistence_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("persistence_scaling");
    for key_count in [10usize, 100, 500] {
        let store: ProfileStore<String> = ProfileStore::new();
        for (i, obs) in generate_test_data(key_count).into_iter().enumerate() {
            store.register(format!("task-{i}"), obs.observed_complexity, Some(obs.input_complexity));
        }
        let path = std::env::temp_dir().join(format!("profile-store-bench-{key_count}.dat"));

        group.bench_with_input(BenchmarkId::new("save", key_count), &key_count, |b, _| {
            b.iter(|| store.save(black_box(&path)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("load", key_count), &key_count, |b, _| {
            b.iter(|| {
                let _: ProfileStore<String> = ProfileStore::load(black_box(&path));
            });
        });
        std::fs::remove_file(&path).ok();
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_register_single,
    benchmark_lookup_scaling,
    benchmark_persistence_scaling
);
criterion_main!(benches);
