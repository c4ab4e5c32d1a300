//! Keying and merging benchmarks
//!
//! Run with: `cargo bench --bench merge_benchmarks`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use composable_resource_core::entity::{add_or_update_by_id, union_by_id, EntityTable};
use composable_resource_core::request::RequestDescriptor;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

fn page(offset: usize, len: usize) -> Vec<Value> {
    (offset..offset + len)
        .map(|id| json!({"id": id, "title": format!("post {id}"), "tags": ["a", "b"]}))
        .collect()
}

fn benchmark_request_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_key");
    group.throughput(Throughput::Elements(1));

    let small = RequestDescriptor::get("/api/posts/");
    let nested = RequestDescriptor::get("/api/posts/")
        .with_data(json!({"page": 2, "filter": {"tag": "rust", "author": {"id": 7}}}));

    group.bench_function("empty_data", |b| b.iter(|| black_box(&small).key()));
    group.bench_function("nested_data", |b| b.iter(|| black_box(&nested).key()));
    group.finish();
}

fn benchmark_union(c: &mut Criterion) {
    let mut group = c.benchmark_group("union_by_id");

    for size in [10usize, 100, 1_000] {
        let table = union_by_id(&EntityTable::new(), &page(0, size), "id").expect("seed table");
        let batch = page(size / 2, size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| union_by_id(black_box(&table), black_box(batch), "id"));
        });
    }
    group.finish();
}

fn benchmark_add_or_update(c: &mut Criterion) {
    let table = union_by_id(&EntityTable::new(), &page(0, 1_000), "id").expect("seed table");
    let record = json!({"id": 500, "title": "updated"});

    c.bench_function("add_or_update_by_id/1000", |b| {
        b.iter(|| add_or_update_by_id(black_box(&table), black_box(&record), "id"));
    });
}

criterion_group!(benches, benchmark_request_key, benchmark_union, benchmark_add_or_update);
criterion_main!(benches);
