//! Benchmarks for output cache fingerprinting.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stagegate::pipeline::CacheQuery;
use stagegate::state::StateSnapshot;

fn state_with(entries: usize) -> StateSnapshot {
    let mut state = StateSnapshot::new();
    for i in 0..entries {
        state.insert(format!("draft.field_{i}"), serde_json::json!(format!("value {i}")));
        state.insert(format!("other.field_{i}"), serde_json::json!(i));
    }
    state
}

fn fingerprint_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    for entries in [0, 16, 256] {
        let state = state_with(entries);
        group.bench_with_input(BenchmarkId::from_parameter(entries), &state, |b, state| {
            b.iter(|| {
                let query = CacheQuery {
                    producer: "writer",
                    version: "0.1.0",
                    stage: "draft",
                    task: "Write the draft section about ownership",
                    state,
                };
                black_box(query.fingerprint())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, fingerprint_benchmark);
criterion_main!(benches);
