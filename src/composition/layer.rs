//! Layer - one pattern plus its effect chain
//!
//! Simple model: one layer = one pattern = one kind of sound.
//! Several layers sounding together form a section.

use std::fmt;

use crate::effects::{apply_chain, Effect};
use crate::error::PatternError;
use crate::sequencing::notes::note_to_midi;
use crate::sequencing::parser::step_words;
use crate::sequencing::{Event, Hap, Pattern, Payload, TimeSpan};

/// How a layer turns pattern tokens into payloads
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    /// Tokens are sample names (`s("bd*4")`)
    Sound,
    /// Tokens are pitches (`note("c2 g1")`)
    Note,
}

/// A pattern with its sound source and effect chain
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pattern: Pattern,
    kind: LayerKind,
    /// Sample used for note layers, or overriding the tokens of a sound layer
    instrument: Option<String>,
    effects: Vec<Effect>,
}

impl Layer {
    /// A layer whose steps name samples
    pub fn sound(source: &str) -> Result<Self, PatternError> {
        Ok(Self::from_pattern(Pattern::parse(source)?, LayerKind::Sound))
    }

    /// A layer whose steps are note names or numbers
    pub fn note(source: &str) -> Result<Self, PatternError> {
        let pattern = Pattern::parse(source)?;
        check_notes(source)?;
        Ok(Self::from_pattern(pattern, LayerKind::Note))
    }

    /// Wrap an existing pattern
    pub fn from_pattern(pattern: Pattern, kind: LayerKind) -> Self {
        Self {
            pattern,
            kind,
            instrument: None,
            effects: Vec::new(),
        }
    }

    /// Set the sample that plays this layer (`.s("saw")`)
    pub fn s(mut self, instrument: impl Into<String>) -> Self {
        self.instrument = Some(instrument.into());
        self
    }

    /// Append an effect to the chain
    pub fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn gain(self, value: impl Into<crate::effects::ParamValue>) -> Self {
        self.with(Effect::gain(value))
    }

    pub fn room(self, value: impl Into<crate::effects::ParamValue>) -> Self {
        self.with(Effect::room(value))
    }

    pub fn delay(self, value: impl Into<crate::effects::ParamValue>) -> Self {
        self.with(Effect::delay(value))
    }

    pub fn lpf(self, value: impl Into<crate::effects::ParamValue>) -> Self {
        self.with(Effect::lpf(value))
    }

    pub fn speed(self, value: impl Into<crate::effects::ParamValue>) -> Self {
        self.with(Effect::speed(value))
    }

    pub fn shape(self, value: impl Into<crate::effects::ParamValue>) -> Self {
        self.with(Effect::shape(value))
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn instrument(&self) -> Option<&str> {
        self.instrument.as_deref()
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Events with onset in `span`, effects applied, in onset order.
    pub fn query(&self, span: TimeSpan) -> Vec<Event> {
        self.pattern
            .query(span)
            .into_iter()
            .filter_map(|hap| self.to_event(hap))
            .map(|event| apply_chain(&self.effects, event))
            .collect()
    }

    fn to_event(&self, hap: Hap) -> Option<Event> {
        let token = hap.value?;
        let payload = match self.kind {
            LayerKind::Sound => Payload::Sample {
                name: self.instrument.clone().unwrap_or(token),
            },
            LayerKind::Note => Payload::Note {
                // Tokens were checked when the layer was built
                pitch: note_to_midi(&token)?,
                instrument: self.instrument.clone(),
            },
        };
        Some(Event::new(hap.onset, hap.duration, payload))
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LayerKind::Sound => write!(f, "s({})", self.pattern)?,
            LayerKind::Note => write!(f, "note({})", self.pattern)?,
        }
        if let Some(inst) = &self.instrument {
            write!(f, ".s(\"{}\")", inst)?;
        }
        for effect in &self.effects {
            write!(f, "{}", effect)?;
        }
        Ok(())
    }
}

/// Reject steps that are not note names
fn check_notes(source: &str) -> Result<(), PatternError> {
    for (span, word) in step_words(source)? {
        if note_to_midi(&word).is_none() {
            return Err(PatternError::syntax(format!("'{}' is not a note name", word), span));
        }
    }
    Ok(())
}
