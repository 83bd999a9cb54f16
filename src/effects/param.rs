//! Parameter bindings carried by events.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use super::signal::Signal;
use crate::error::ParamError;
use crate::sequencing::time::{Rational, TimeSpan};

/// Parameters an effect can bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Param {
    /// Amplitude multiplier
    Gain,
    /// Reverb mix in [0, 1]
    Room,
    /// Echo mix in [0, 1]
    Delay,
    /// Low-pass cutoff in Hz
    Cutoff,
    /// Playback-rate multiplier
    Speed,
    /// Waveshaping amount in [0, 1)
    Shape,
}

impl Param {
    pub fn name(self) -> &'static str {
        match self {
            Param::Gain => "gain",
            Param::Room => "room",
            Param::Delay => "delay",
            Param::Cutoff => "lpf",
            Param::Speed => "speed",
            Param::Shape => "shape",
        }
    }

    /// Value the backend assumes when an event has no binding
    pub fn default_value(self) -> f64 {
        match self {
            Param::Gain | Param::Speed => 1.0,
            Param::Room | Param::Delay | Param::Shape => 0.0,
            Param::Cutoff => 20_000.0,
        }
    }

    /// Check and normalize an evaluated value
    fn validate(self, value: f64) -> Result<f64, ParamError> {
        if !value.is_finite() {
            return Err(ParamError::Malformed {
                param: self.name(),
                value,
                reason: "not a finite number",
            });
        }
        match self {
            Param::Gain if value < 0.0 => Err(ParamError::Malformed {
                param: self.name(),
                value,
                reason: "gain must not be negative",
            }),
            Param::Cutoff if value <= 0.0 => Err(ParamError::Malformed {
                param: self.name(),
                value,
                reason: "cutoff must be above 0 Hz",
            }),
            Param::Speed if value == 0.0 => Err(ParamError::Malformed {
                param: self.name(),
                value,
                reason: "speed must not be zero",
            }),
            Param::Room | Param::Delay => Ok(value.clamp(0.0, 1.0)),
            Param::Shape => Ok(value.clamp(0.0, 0.999)),
            _ => Ok(value),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A constant or time-varying parameter value
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParamValue {
    Constant(f64),
    Sweep(Signal),
    /// Product of factors (gain applied over a sweep)
    Product(Vec<ParamValue>),
}

impl ParamValue {
    /// Multiply two values, folding constants together
    pub fn multiply(self, other: ParamValue) -> ParamValue {
        match (self, other) {
            (ParamValue::Constant(a), ParamValue::Constant(b)) => ParamValue::Constant(a * b),
            (ParamValue::Product(mut factors), other) => {
                factors.push(other);
                ParamValue::Product(factors)
            }
            (a, b) => ParamValue::Product(vec![a, b]),
        }
    }

    /// Evaluate at absolute cycle position `at`. Never cached.
    pub fn value_at(&self, at: Rational, section: TimeSpan) -> f64 {
        match self {
            ParamValue::Constant(v) => *v,
            ParamValue::Sweep(signal) => signal.value_at(at, section),
            ParamValue::Product(factors) => factors
                .iter()
                .map(|f| f.value_at(at, section))
                .product(),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, ParamValue::Constant(_))
    }

    /// Total order used to break ties between otherwise equal events.
    /// Constants sort first by value, time-varying values by their text.
    pub fn ordering(&self, other: &ParamValue) -> Ordering {
        match (self, other) {
            (ParamValue::Constant(a), ParamValue::Constant(b)) => a.total_cmp(b),
            (ParamValue::Constant(_), _) => Ordering::Less,
            (_, ParamValue::Constant(_)) => Ordering::Greater,
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Constant(v)
    }
}

impl From<Signal> for ParamValue {
    fn from(s: Signal) -> Self {
        ParamValue::Sweep(s)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Constant(v) => write!(f, "{}", v),
            ParamValue::Sweep(s) => write!(f, "{}", s),
            ParamValue::Product(factors) => {
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" * ")?;
                    }
                    write!(f, "{}", factor)?;
                }
                Ok(())
            }
        }
    }
}

/// Parameter bindings of one event, in a stable order
pub type ParamMap = BTreeMap<Param, ParamValue>;

/// Compare two bindings key by key, then value by value
pub fn params_ordering(a: &ParamMap, b: &ParamMap) -> Ordering {
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        let order = ka.cmp(kb).then_with(|| va.ordering(vb));
        if order != Ordering::Equal {
            return order;
        }
    }
    a.len().cmp(&b.len())
}

/// Parameter values evaluated for one dispatch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParams {
    values: BTreeMap<Param, f64>,
}

impl ResolvedParams {
    /// Evaluate and validate every binding at `at`.
    pub fn evaluate(params: &ParamMap, at: Rational, section: TimeSpan) -> Result<Self, ParamError> {
        let mut values = BTreeMap::new();
        for (&param, value) in params {
            values.insert(param, param.validate(value.value_at(at, section))?);
        }
        Ok(Self { values })
    }

    /// Bound value, if the event set one
    pub fn get(&self, param: Param) -> Option<f64> {
        self.values.get(&param).copied()
    }

    /// Bound value or the parameter's default
    pub fn value(&self, param: Param) -> f64 {
        self.get(param).unwrap_or_else(|| param.default_value())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Param, f64)> + '_ {
        self.values.iter().map(|(&p, &v)| (p, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for ResolvedParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (param, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={:.3}", param, value)?;
        }
        Ok(())
    }
}
