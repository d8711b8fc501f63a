//! Benchmarks for keyed child reconciliation.
//!
//! Run with: cargo bench -p trellis-core --bench reconcile

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use trellis_core::backend::MemoryBackend;
use trellis_core::vdom::{OldTree, Patcher, VNode};

fn keyed_list(keys: impl Iterator<Item = i64>) -> VNode {
    VNode::element("ul").children(
        keys.map(|k| VNode::element("li").key(k).child(VNode::text(k.to_string()))),
    )
}

/// A patcher with `old` already realized.
fn mounted(n: i64) -> (Patcher, VNode) {
    let (_memory, backend) = MemoryBackend::shared();
    let patcher = Patcher::new(backend);
    let mut old = keyed_list(0..n);
    patcher.patch(None, Some(&mut old), false, false);
    (patcher, old)
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile/keyed");

    for n in [10i64, 100, 1000] {
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("identical", n), &n, |b, &n| {
            b.iter_batched(
                || (mounted(n), keyed_list(0..n)),
                |((patcher, old), mut new)| {
                    black_box(patcher.patch(Some(OldTree::VNode(old)), Some(&mut new), false, false))
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("reverse", n), &n, |b, &n| {
            b.iter_batched(
                || (mounted(n), keyed_list((0..n).rev())),
                |((patcher, old), mut new)| {
                    black_box(patcher.patch(Some(OldTree::VNode(old)), Some(&mut new), false, false))
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("shuffle", n), &n, |b, &n| {
            // Deterministic interleave: evens ascending, then odds descending.
            let order: Vec<i64> = (0..n)
                .filter(|k| k % 2 == 0)
                .chain((0..n).filter(|k| k % 2 == 1).rev())
                .collect();
            b.iter_batched(
                || (mounted(n), keyed_list(order.iter().copied())),
                |((patcher, old), mut new)| {
                    black_box(patcher.patch(Some(OldTree::VNode(old)), Some(&mut new), false, false))
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reconcile);
criterion_main!(benches);
