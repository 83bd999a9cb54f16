//! Effect chains and the parameters they bind.
//!
//! Effects never touch audio here: they only annotate events with parameter
//! bindings that the audio backend interprets. Time-varying bindings are
//! plain data (`Signal`) sampled at each event's onset.

/// Ordered per-event transforms (`gain`, `room`, `lpf`, ...).
pub mod chain;
/// Parameter keys, constant/swept values and evaluation.
pub mod param;
/// Periodic waveforms and section ramps.
pub mod signal;

pub use chain::{apply_chain, Effect};
pub use param::{Param, ParamMap, ParamValue, ResolvedParams};
pub use signal::{Signal, Waveform};
