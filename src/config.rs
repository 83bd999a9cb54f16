//! Engine tuning knobs.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings for the scheduling and dispatch threads
///
/// Built in the same chained style as the rest of the crate:
///
/// ```
/// use saavy_cycles::config::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::new()
///     .quantum(Duration::from_millis(5))
///     .looping(false);
/// assert_eq!(config.quantum_duration(), Duration::from_millis(5));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Scheduling thread wake interval, in milliseconds
    pub quantum_ms: f64,
    /// How far ahead of "now" events are queued, in milliseconds
    pub lookahead_ms: f64,
    /// Capacity of the dispatch queue before the oldest entry is dropped
    pub queue_capacity: usize,
    /// Capacity of the control ring buffer
    pub control_capacity: usize,
    /// Wrap back to cycle 0 after the last section
    pub looping: bool,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            quantum_ms: 10.0,
            lookahead_ms: 50.0,
            queue_capacity: 1024,
            control_capacity: 64,
            looping: true,
        }
    }

    pub fn quantum(mut self, quantum: Duration) -> Self {
        self.quantum_ms = quantum.as_secs_f64() * 1000.0;
        self
    }

    pub fn lookahead(mut self, lookahead: Duration) -> Self {
        self.lookahead_ms = lookahead.as_secs_f64() * 1000.0;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn control_capacity(mut self, capacity: usize) -> Self {
        self.control_capacity = capacity;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Quantum as a `Duration`, never shorter than 1 ms
    pub fn quantum_duration(&self) -> Duration {
        Duration::from_secs_f64(self.quantum_ms.max(1.0) / 1000.0)
    }

    pub fn lookahead_duration(&self) -> Duration {
        Duration::from_secs_f64(self.lookahead_ms.max(0.0) / 1000.0)
    }

    /// Queue capacities are at least one slot
    pub(crate) fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    pub(crate) fn control_capacity_clamped(&self) -> usize {
        self.control_capacity.max(1)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
