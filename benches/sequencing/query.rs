//! Benchmarks for pattern and section queries.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_cycles::{Layer, Pattern, Rational, Section, TimeSpan};

use crate::WINDOWS;

fn window(num: i64, den: i64) -> TimeSpan {
    TimeSpan::new(Rational::ZERO, Rational::new(num, den))
}

pub fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequencing/query");

    let pattern = Pattern::parse("<bd [~ bd]> [sn, hh*2] [bd@3 ~]!2").expect("valid pattern");
    let section = Section::stack(
        ["bd*4", "~ sn", "hh*16", "c2 [c2 g1] f1 [g1 g#1]"]
            .iter()
            .filter_map(|src| Layer::sound(src).ok())
            .map(|layer| layer.gain(0.8).room(0.3))
            .collect(),
    )
    .with_cycles(4);

    for &(num, den) in WINDOWS {
        let span = window(num, den);
        let label = format!("{}/{}", num, den);

        group.bench_with_input(BenchmarkId::new("pattern", &label), &span, |b, &span| {
            b.iter(|| pattern.query(black_box(span)))
        });

        group.bench_with_input(BenchmarkId::new("section", &label), &span, |b, &span| {
            b.iter(|| section.query(black_box(span)))
        });
    }

    group.finish();
}
