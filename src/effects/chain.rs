//! Per-event effect transforms.

/*
Effect Chains
=============

A layer carries an ordered list of effects. Each effect is a pure function
Event -> Event that only touches the event's parameter bindings; onset,
duration and payload pass through unchanged.

Composition rules
-----------------

Effects apply left to right in declaration order, so a later effect sees
what earlier ones bound:

    gain     multiplicative   gain(1.2).gain(0.5)  ->  gain = 0.6
    room     replace          room(0.2).room(0.5)  ->  room = 0.5
    delay    replace
    lpf      replace
    speed    replace
    shape    replace

An unbound gain counts as 1.0, so a single gain(x) simply sets x.
*/

use std::fmt;

use super::param::{Param, ParamValue};
use crate::sequencing::event::Event;

/// A single effect with its argument
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub param: Param,
    pub value: ParamValue,
}

impl Effect {
    pub fn new(param: Param, value: impl Into<ParamValue>) -> Self {
        Self {
            param,
            value: value.into(),
        }
    }

    pub fn gain(value: impl Into<ParamValue>) -> Self {
        Self::new(Param::Gain, value)
    }

    pub fn room(value: impl Into<ParamValue>) -> Self {
        Self::new(Param::Room, value)
    }

    pub fn delay(value: impl Into<ParamValue>) -> Self {
        Self::new(Param::Delay, value)
    }

    pub fn lpf(value: impl Into<ParamValue>) -> Self {
        Self::new(Param::Cutoff, value)
    }

    pub fn speed(value: impl Into<ParamValue>) -> Self {
        Self::new(Param::Speed, value)
    }

    pub fn shape(value: impl Into<ParamValue>) -> Self {
        Self::new(Param::Shape, value)
    }

    /// Look up an effect by its method name in a score
    pub fn from_name(name: &str, value: ParamValue) -> Option<Self> {
        let param = match name {
            "gain" => Param::Gain,
            "room" => Param::Room,
            "delay" => Param::Delay,
            "lpf" | "cutoff" => Param::Cutoff,
            "speed" => Param::Speed,
            "shape" => Param::Shape,
            _ => return None,
        };
        Some(Self::new(param, value))
    }

    /// Whether this effect combines with an existing binding instead of replacing it
    pub fn is_multiplicative(&self) -> bool {
        self.param == Param::Gain
    }

    /// Apply to one event
    pub fn apply(&self, mut event: Event) -> Event {
        let value = match event.params.remove(&self.param) {
            Some(prior) if self.is_multiplicative() => prior.multiply(self.value.clone()),
            _ => self.value.clone(),
        };
        event.params.insert(self.param, value);
        event
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}({})", self.param, self.value)
    }
}

/// Apply a chain of effects in declaration order
pub fn apply_chain(effects: &[Effect], event: Event) -> Event {
    effects.iter().fold(event, |event, effect| effect.apply(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::signal::Signal;
    use crate::sequencing::event::Payload;
    use crate::sequencing::time::{Rational, TimeSpan};
    use approx::assert_relative_eq;

    fn event() -> Event {
        Event::new(Rational::ZERO, Rational::new(1, 4), Payload::sample("bd"))
    }

    fn gain_of(e: &Event) -> f64 {
        e.params[&Param::Gain].value_at(e.onset, e.section)
    }

    #[test]
    fn test_single_gain_sets_value() {
        let e = Effect::gain(1.2).apply(event());
        assert_relative_eq!(gain_of(&e), 1.2);
    }

    #[test]
    fn test_gain_composes_multiplicatively() {
        let e = apply_chain(&[Effect::gain(1.2), Effect::gain(0.5)], event());
        assert_relative_eq!(gain_of(&e), 0.6);
    }

    #[test]
    fn test_replace_only_effects_overwrite() {
        let e = apply_chain(&[Effect::room(0.2), Effect::room(0.5), Effect::lpf(800.0)], event());
        assert_eq!(e.params[&Param::Room], ParamValue::Constant(0.5));
        assert_eq!(e.params[&Param::Cutoff], ParamValue::Constant(800.0));
    }

    #[test]
    fn test_effects_leave_timing_and_payload_alone() {
        let before = event();
        let after = apply_chain(
            &[Effect::gain(0.7), Effect::delay(0.25), Effect::speed(1.5)],
            before.clone(),
        );
        assert_eq!(after.onset, before.onset);
        assert_eq!(after.duration, before.duration);
        assert_eq!(after.payload, before.payload);
        assert_eq!(after.section, before.section);
        assert_eq!(after.params.len(), 3);
    }

    #[test]
    fn test_sweep_cutoff_is_sampled_at_onset() {
        let sweep = Signal::sine().slow(4.0).range(400.0, 2000.0);
        let e = Effect::lpf(sweep).apply(event());
        let early = e.params[&Param::Cutoff].value_at(Rational::ZERO, TimeSpan::cycles(0, 1));
        let later = e.params[&Param::Cutoff].value_at(Rational::ONE, TimeSpan::cycles(0, 1));
        assert_relative_eq!(early, 1200.0, epsilon = 1e-9);
        assert_relative_eq!(later, 2000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(
            Effect::from_name("lpf", ParamValue::Constant(1200.0)),
            Some(Effect::lpf(1200.0))
        );
        assert!(Effect::from_name("crush", ParamValue::Constant(4.0)).is_none());
    }
}
