//! Whole-score scenario: parse the demo score and walk its timeline the way
//! the scheduler does, one quantum at a time.

use std::hint::black_box;

use criterion::Criterion;
use saavy_cycles::{Rational, Score, TimeSpan};

const DEMO: &str = include_str!("../../scores/pata_negra.score");

pub fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/score");

    group.bench_function("parse", |b| b.iter(|| Score::parse(black_box(DEMO))));

    if let Ok(score) = Score::parse(DEMO) {
        let timeline = score.timeline();
        // 10 ms windows at 128/60 cps are about 1/47 of a cycle
        let step = Rational::new(1, 48);
        group.bench_function("scan_one_pass", |b| {
            b.iter(|| {
                let mut at = Rational::ZERO;
                let mut count = 0;
                while at < timeline.length() {
                    let next = at + step;
                    count += timeline.query_looped(TimeSpan::new(at, next)).len();
                    at = next;
                }
                black_box(count)
            })
        });
    }

    group.finish();
}
