//! Benchmarks for route selection and flow execution.
//!
//! Run with: cargo bench --bench router

use std::collections::HashMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use siprouted::flow::{Flow, FlowExecutor, TraversalContext};
use siprouted::router::{pick_host, rank_candidates, ProviderCatalog};
use siprouted::store::{ProviderHost, ProviderRate};

fn rate_table(count: usize) -> Vec<ProviderRate> {
    (0..count)
        .map(|i| ProviderRate {
            provider_id: format!("p{}", i),
            provider_name: format!("provider-{}", i),
            dial_prefix: "00".to_string(),
            rate: 0.001 * (i % 50) as f64,
            rate_prefixes: vec![format!("^{}", 44 + i % 7), format!("^4420{}", i % 10)],
            active_channels: (i % 30) as u32,
        })
        .collect()
}

fn hosts(count: usize) -> HashMap<String, Vec<ProviderHost>> {
    (0..count)
        .map(|i| {
            (
                format!("p{}", i),
                vec![
                    ProviderHost {
                        address: format!("a.p{}.example", i),
                        priority_prefixes: String::new(),
                    },
                    ProviderHost {
                        address: format!("b.p{}.example", i),
                        priority_prefixes: "^4420,^4421".to_string(),
                    },
                ],
            )
        })
        .collect()
}

fn bench_rank_candidates(c: &mut Criterion) {
    let mut group = c.benchmark_group("router/rank_candidates");

    for count in [10, 100, 1000].iter() {
        let rows = rate_table(*count);
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &rows, |b, rows| {
            b.iter(|| black_box(rank_candidates(rows, "442071234567").unwrap()))
        });
    }

    group.finish();
}

fn bench_pick_host(c: &mut Criterion) {
    let mut group = c.benchmark_group("router/pick_host");
    let hosts = hosts(1).remove("p0").unwrap_or_default();

    group.bench_function("priority_match", |b| {
        b.iter(|| black_box(pick_host(&hosts, "442071234567").unwrap()))
    });

    group.bench_function("default_host", |b| {
        b.iter(|| black_box(pick_host(&hosts, "33123456789").unwrap()))
    });

    group.finish();
}

fn flow_document(depth: usize) -> serde_json::Value {
    let mut cells = vec![json!({ "id": "start", "type": "devs.LaunchModel" })];
    let mut models = Vec::new();
    let mut previous = ("start".to_string(), "Out");

    for i in 0..depth {
        let id = format!("check{}", i);
        cells.push(json!({ "id": id, "type": "devs.LocationCheckModel" }));
        cells.push(json!({
            "id": format!("l{}", i), "type": "devs.FlowLink",
            "source": { "id": previous.0, "port": previous.1 },
            "target": { "id": id, "port": "In" }
        }));
        models.push(json!({ "id": id, "data": { "countries": ["44"] } }));
        previous = (id, "Out");
    }

    cells.push(json!({ "id": "cheap", "type": "devs.LowCostModel" }));
    cells.push(json!({
        "id": "l-last", "type": "devs.FlowLink",
        "source": { "id": previous.0, "port": previous.1 },
        "target": { "id": "cheap", "port": "In" }
    }));

    json!({ "graph": { "cells": cells }, "models": models })
}

fn bench_flow_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("flow/execute");
    let catalog = Arc::new(ProviderCatalog::new(rate_table(50), hosts(50)));
    let executor = FlowExecutor::new();

    for depth in [1, 10, 50].iter() {
        let flow = Flow::from_value("bench", &flow_document(*depth)).unwrap();
        let ctx = TraversalContext::new(catalog.clone())
            .with_var("to", "442071234567")
            .with_var("dest_code", "44");

        group.throughput(Throughput::Elements(*depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, _| {
            b.iter(|| {
                let mut flow = flow.clone();
                black_box(executor.run(&mut flow, ctx.clone()).unwrap())
            })
        });
    }

    group.finish();
}

fn bench_flow_build(c: &mut Criterion) {
    let document = flow_document(50);

    c.bench_function("flow/build_50", |b| {
        b.iter(|| black_box(Flow::from_value("bench", &document).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_rank_candidates,
    bench_pick_host,
    bench_flow_execution,
    bench_flow_build,
);
criterion_main!(benches);
