use std::cmp::Ordering;
use std::fmt;

use super::time::{Rational, TimeSpan};
use crate::effects::param::{params_ordering, ParamMap};

/// What an event plays
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A registered sample, by name
    Sample { name: String },
    /// A pitch (MIDI note number) played on an instrument
    Note {
        pitch: f64,
        instrument: Option<String>,
    },
}

impl Payload {
    pub fn sample(name: impl Into<String>) -> Self {
        Payload::Sample { name: name.into() }
    }

    /// Name of the sample that has to be resolved for this payload
    pub fn sample_name(&self) -> Option<&str> {
        match self {
            Payload::Sample { name } => Some(name),
            Payload::Note { instrument, .. } => instrument.as_deref(),
        }
    }

    fn ordering(&self, other: &Payload) -> Ordering {
        match (self, other) {
            (Payload::Sample { name: a }, Payload::Sample { name: b }) => a.cmp(b),
            (Payload::Sample { .. }, Payload::Note { .. }) => Ordering::Less,
            (Payload::Note { .. }, Payload::Sample { .. }) => Ordering::Greater,
            (
                Payload::Note {
                    pitch: a,
                    instrument: ia,
                },
                Payload::Note {
                    pitch: b,
                    instrument: ib,
                },
            ) => ia.cmp(ib).then(a.total_cmp(b)),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Sample { name } => f.write_str(name),
            Payload::Note { pitch, instrument } => match instrument {
                Some(inst) => write!(f, "{}@{}", inst, pitch),
                None => write!(f, "note {}", pitch),
            },
        }
    }
}

/// A single sounding event on the timeline
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Absolute onset in cycles
    pub onset: Rational,
    /// Length in cycles
    pub duration: Rational,
    pub payload: Payload,
    /// Effect bindings, evaluated at dispatch time
    pub params: ParamMap,
    /// Absolute span of the section this event belongs to
    pub section: TimeSpan,
}

impl Event {
    pub fn new(onset: Rational, duration: Rational, payload: Payload) -> Self {
        Self {
            onset,
            duration,
            payload,
            params: ParamMap::new(),
            section: TimeSpan::new(onset.sam(), onset.sam() + Rational::ONE),
        }
    }

    /// Move the event (and its section) along the cycle axis
    pub fn shifted(mut self, by: Rational) -> Self {
        self.onset += by;
        self.section = self.section.shift(by);
        self
    }

    /// Ordering used when merging layers: onset, then duration, then
    /// payload, then params
    pub fn timeline_order(&self, other: &Event) -> Ordering {
        self.onset
            .cmp(&other.onset)
            .then(self.duration.cmp(&other.duration))
            .then_with(|| self.payload.ordering(&other.payload))
            .then_with(|| params_ordering(&self.params, &other.params))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} +{} {}", self.onset, self.duration, self.payload)?;
        for (param, value) in &self.params {
            write!(f, " {}={}", param, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shifted_moves_section() {
        let e = Event::new(Rational::new(1, 4), Rational::new(1, 4), Payload::sample("bd"));
        let moved = e.shifted(Rational::from_integer(3));

        assert_eq!(moved.onset, Rational::new(13, 4));
        assert_eq!(moved.section, TimeSpan::cycles(3, 4));
    }

    #[test]
    fn test_timeline_order() {
        let a = Event::new(Rational::ZERO, Rational::new(1, 4), Payload::sample("bd"));
        let b = Event::new(Rational::ZERO, Rational::new(1, 4), Payload::sample("hh"));
        let c = Event::new(Rational::new(1, 8), Rational::new(1, 8), Payload::sample("aa"));

        assert_eq!(a.timeline_order(&b), Ordering::Less);
        assert_eq!(b.timeline_order(&c), Ordering::Less);
    }

    #[test]
    fn test_sample_name() {
        let note = Payload::Note {
            pitch: 36.0,
            instrument: Some("saw".into()),
        };
        assert_eq!(note.sample_name(), Some("saw"));
        assert_eq!(Payload::sample("cunao").sample_name(), Some("cunao"));
    }
}
