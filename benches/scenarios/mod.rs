//! Whole-score scenarios.

mod score;

pub use score::bench_score;
