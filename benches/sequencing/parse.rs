//! Benchmarks for the mini-notation parser.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_cycles::Pattern;

const SOURCES: &[(&str, &str)] = &[
    ("single", "bd"),
    ("fast", "hh*16"),
    ("bassline", "c2 [c2 g1] f1 [g1 g#1]"),
    ("nested", "<bd [~ bd]> [sn, hh*2] [bd@3 ~]!2 <[cp cp] ~>/2"),
];

pub fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequencing/parse");

    for &(name, source) in SOURCES {
        group.bench_with_input(BenchmarkId::new("pattern", name), &source, |b, &source| {
            b.iter(|| Pattern::parse(black_box(source)))
        });
    }

    group.finish();
}
