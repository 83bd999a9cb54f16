//! Continuous control signals for time-varying parameters.

/*
Control Signals
===============

A signal is a value that changes smoothly with time instead of per step.
It is sampled once per event, at the event's onset, so a filter sweep moves
a little further on every note.

Vocabulary
----------

  unipolar      Output in 0.0 to 1.0. All waveforms here are unipolar so
                `range(lo, hi)` maps them straight onto a parameter range.

  slow(n)       Stretch the waveform so one period lasts n cycles.
  fast(n)       Squeeze it so n periods fit in one cycle.

  line(a, b)    A ramp tied to the enclosing section rather than to absolute
                time: `a` at the first cycle of the section, approaching `b`
                as the section ends. Used for risers.


Shapes
------

    sine     smooth sweep, starts at the midpoint going up
    cosine   sine shifted by a quarter period (starts at the top)
    saw      rises linearly, snaps back each period
    tri      rises then falls linearly
    square   1.0 for the first half of the period, 0.0 for the second

Signals are plain data (a tagged enum) rather than boxed closures, so events
stay comparable, printable and cheap to clone.
*/

use std::f64::consts::TAU;
use std::fmt;

use crate::sequencing::time::{Rational, TimeSpan};

/// Periodic waveform shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Waveform {
    Sine,
    Cosine,
    Saw,
    Tri,
    Square,
}

impl Waveform {
    /// Unipolar value at `phase` in [0, 1)
    pub fn at_phase(self, phase: f64) -> f64 {
        match self {
            Waveform::Sine => 0.5 + 0.5 * (TAU * phase).sin(),
            Waveform::Cosine => 0.5 + 0.5 * (TAU * phase).cos(),
            Waveform::Saw => phase,
            Waveform::Tri => {
                if phase < 0.5 {
                    phase * 2.0
                } else {
                    2.0 - phase * 2.0
                }
            }
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Cosine => "cosine",
            Waveform::Saw => "saw",
            Waveform::Tri => "tri",
            Waveform::Square => "square",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sine" => Some(Waveform::Sine),
            "cosine" => Some(Waveform::Cosine),
            "saw" => Some(Waveform::Saw),
            "tri" => Some(Waveform::Tri),
            "square" => Some(Waveform::Square),
            _ => None,
        }
    }
}

/// A time-varying control value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Signal {
    /// Periodic waveform over absolute cycle position
    Periodic {
        shape: Waveform,
        /// Period length in cycles
        period: f64,
        lo: f64,
        hi: f64,
    },
    /// Linear ramp across the enclosing section
    Line { from: f64, to: f64 },
}

impl Signal {
    /// A waveform with a one-cycle period in 0..1
    pub fn wave(shape: Waveform) -> Self {
        Signal::Periodic {
            shape,
            period: 1.0,
            lo: 0.0,
            hi: 1.0,
        }
    }

    pub fn sine() -> Self {
        Self::wave(Waveform::Sine)
    }

    pub fn line(from: f64, to: f64) -> Self {
        Signal::Line { from, to }
    }

    /// Stretch the period by `factor`
    pub fn slow(self, factor: f64) -> Self {
        match self {
            Signal::Periodic {
                shape,
                period,
                lo,
                hi,
            } => Signal::Periodic {
                shape,
                period: period * factor,
                lo,
                hi,
            },
            line => line,
        }
    }

    /// Shrink the period by `factor`
    pub fn fast(self, factor: f64) -> Self {
        self.slow(1.0 / factor)
    }

    /// Map the current output range onto `lo..hi`
    pub fn range(self, new_lo: f64, new_hi: f64) -> Self {
        match self {
            Signal::Periodic {
                shape,
                period,
                lo,
                hi,
            } => Signal::Periodic {
                shape,
                period,
                lo: new_lo + lo * (new_hi - new_lo),
                hi: new_lo + hi * (new_hi - new_lo),
            },
            Signal::Line { from, to } => Signal::Line {
                from: new_lo + from * (new_hi - new_lo),
                to: new_lo + to * (new_hi - new_lo),
            },
        }
    }

    /// Sample the signal at absolute cycle position `at`.
    ///
    /// `section` is the absolute span of the section the event belongs to;
    /// only `Line` looks at it.
    pub fn value_at(&self, at: Rational, section: TimeSpan) -> f64 {
        match *self {
            Signal::Periodic {
                shape,
                period,
                lo,
                hi,
            } => {
                let pos = at.to_f64() / period;
                let phase = pos - pos.floor();
                lo + shape.at_phase(phase) * (hi - lo)
            }
            Signal::Line { from, to } => {
                let len = section.duration().to_f64();
                let progress = if len > 0.0 {
                    ((at - section.begin).to_f64() / len).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                from + (to - from) * progress
            }
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Periodic {
                shape,
                period,
                lo,
                hi,
            } => write!(f, "{}.slow({}).range({}, {})", shape.name(), period, lo, hi),
            Signal::Line { from, to } => write!(f, "line({}, {})", from, to),
        }
    }
}
