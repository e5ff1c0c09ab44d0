//! Performance benchmarks for BIOTOPE

use biotope::{Config, Ecosystem, Snapshot};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn sized_config(side: u32) -> Config {
    let mut config = Config::default();
    config.biotope.width = side;
    config.biotope.height = side;
    let scale = (side * side) as f64 / (200.0 * 200.0);
    for row in config.species.values_mut() {
        row.initial_count = ((row.initial_count as f64 * scale).ceil() as usize).max(1);
    }
    config
}

fn benchmark_evolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("evolve");

    for side in [50u32, 100, 200].iter() {
        let mut eco = Ecosystem::new_with_seed(sized_config(*side), 42).unwrap();

        // Warm up
        eco.run(20).unwrap();

        group.bench_with_input(BenchmarkId::new("grid", side), side, |b, _| {
            b.iter(|| {
                eco.evolve().unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_snapshot(c: &mut Criterion) {
    let mut eco = Ecosystem::new_with_seed(Config::default(), 42).unwrap();
    eco.run(50).unwrap();

    c.bench_function("snapshot_encode", |b| {
        b.iter(|| black_box(eco.create_snapshot()));
    });

    let snapshot = eco.create_snapshot();
    c.bench_function("snapshot_compress", |b| {
        b.iter(|| snapshot.to_compressed(black_box(3)).unwrap());
    });

    let bytes = snapshot.to_compressed(3).unwrap();
    c.bench_function("snapshot_decode", |b| {
        b.iter(|| {
            Snapshot::from_compressed(black_box(&bytes))
                .and_then(Snapshot::decode)
                .unwrap()
        });
    });
}

criterion_group!(benches, benchmark_evolve, benchmark_snapshot);
criterion_main!(benches);
