//! Keyed Diff Benchmarks
//!
//! Measures the children diff on common list updates and the longest
//! increasing subsequence on its own.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis_core::render::{
    longest_increasing_subsequence, DiffStrategy, MemoryHost, Renderer, RendererOptions, VNode,
};

fn list(keys: &[usize]) -> VNode {
    VNode::element("ul").with_children(
        keys.iter()
            .map(|&k| VNode::element("li").with_key(k).with_text(&k.to_string()))
            .collect(),
    )
}

/// Deterministic shuffle so runs are comparable.
fn shuffled(n: usize) -> Vec<usize> {
    let mut keys: Vec<usize> = (0..n).collect();
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    for i in (1..n).rev() {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        keys.swap(i, (seed % (i as u64 + 1)) as usize);
    }
    keys
}

fn bench_patch(c: &mut Criterion) {
    let mut group = c.benchmark_group("patch_children");
    for n in [100usize, 1_000] {
        let base: Vec<usize> = (0..n).collect();
        let updates: [(&str, Vec<usize>); 4] = [
            ("swap", {
                let mut keys = base.clone();
                keys.swap(1, n - 2);
                keys
            }),
            ("reverse", base.iter().rev().copied().collect()),
            ("shuffle", shuffled(n)),
            ("append", (0..n + 10).collect()),
        ];

        for strategy in [DiffStrategy::Fast, DiffStrategy::DoubleEnded] {
            for (name, next) in &updates {
                let id = BenchmarkId::new(format!("{strategy:?}/{name}"), n);
                group.bench_with_input(id, next, |b, next| {
                    b.iter(|| {
                        let mut host = MemoryHost::new();
                        let root = host.create_root();
                        let renderer = Renderer::with_options(host, RendererOptions { diff: strategy });
                        renderer.render(Some(list(&base)), root).unwrap();
                        renderer.render(Some(list(black_box(next))), root).unwrap();
                    })
                });
            }
        }
    }
    group.finish();
}

fn bench_lis(c: &mut Criterion) {
    let mut group = c.benchmark_group("lis");
    for n in [100usize, 10_000] {
        let seq: Vec<Option<usize>> = shuffled(n).into_iter().map(Some).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &seq, |b, seq| {
            b.iter(|| longest_increasing_subsequence(black_box(seq)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_patch, bench_lis);
criterion_main!(benches);
