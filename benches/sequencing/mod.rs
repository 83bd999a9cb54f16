//! Sequencing benchmarks.

mod parse;
mod query;

pub use parse::bench_parse;
pub use query::bench_query;
