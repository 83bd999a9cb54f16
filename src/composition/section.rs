use std::fmt;

use super::layer::Layer;
use crate::effects::Effect;
use crate::sequencing::{Event, Rational, TimeSpan};

/// Layers sounding together (`stack(...)`) for a number of cycles
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    name: Option<String>,
    layers: Vec<Layer>,
    cycles: u32,
}

impl Section {
    /// Stack layers into a one-cycle section
    pub fn stack(layers: Vec<Layer>) -> Self {
        Self {
            name: None,
            layers,
            cycles: 1,
        }
    }

    /// Label used in logs and listings
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Let the section run for `cycles` cycles (at least one)
    pub fn with_cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles.max(1);
        self
    }

    /// Append an effect to every layer
    pub fn with(mut self, effect: Effect) -> Self {
        self.layers = self
            .layers
            .into_iter()
            .map(|layer| layer.with(effect.clone()))
            .collect();
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Length on the cycle axis
    pub fn length(&self) -> Rational {
        Rational::from_integer(self.cycles as i64)
    }

    /// Events with onset in `span`, in section-local cycles.
    ///
    /// The result is the union of every layer's events sorted by onset, then
    /// duration, payload and params, so it does not depend on layer order.
    pub fn query(&self, span: TimeSpan) -> Vec<Event> {
        let extent = TimeSpan::new(Rational::ZERO, self.length());
        let Some(span) = span.intersect(&extent) else {
            return Vec::new();
        };

        let mut events: Vec<Event> = self
            .layers
            .iter()
            .flat_map(|layer| layer.query(span))
            .map(|mut event| {
                event.section = extent;
                event
            })
            .collect();
        events.sort_by(|a, b| a.timeline_order(b));
        events
    }
}

impl From<Layer> for Section {
    fn from(layer: Layer) -> Self {
        Section::stack(vec![layer])
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ", name)?,
            None => f.write_str("stack ")?,
        }
        write!(f, "({} cycle{})", self.cycles, if self.cycles == 1 { "" } else { "s" })?;
        for layer in &self.layers {
            write!(f, "\n  {}", layer)?;
        }
        Ok(())
    }
}
