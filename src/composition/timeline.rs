use std::fmt;
use std::sync::Arc;

use super::section::Section;
use crate::sequencing::{Event, Rational, TimeSpan};

/// Sections played one after another (`cat(...)`)
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    sections: Vec<Arc<Section>>,
    /// Start cycle of each section
    starts: Vec<Rational>,
    length: Rational,
}

impl Timeline {
    /// Concatenate sections along the cycle axis
    pub fn cat(sections: impl IntoIterator<Item = Section>) -> Self {
        let mut timeline = Self::default();
        for section in sections {
            timeline.push(Arc::new(section));
        }
        timeline
    }

    fn push(&mut self, section: Arc<Section>) {
        self.starts.push(self.length);
        self.length += section.length();
        self.sections.push(section);
    }

    /// Add a section at the end
    pub fn then(mut self, section: Section) -> Self {
        self.push(Arc::new(section));
        self
    }

    /// Concatenate another timeline onto this one
    pub fn concat(mut self, other: Timeline) -> Self {
        for section in other.sections {
            self.push(section);
        }
        self
    }

    /// Repeat the whole timeline n times
    pub fn repeat(mut self, n: usize) -> Self {
        let original = self.sections.clone();
        for _ in 1..n {
            for section in &original {
                self.push(Arc::clone(section));
            }
        }
        self
    }

    /// Total length in cycles
    pub fn length(&self) -> Rational {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn sections(&self) -> impl Iterator<Item = (Rational, &Section)> {
        self.starts
            .iter()
            .copied()
            .zip(self.sections.iter().map(|s| s.as_ref()))
    }

    /// Section playing at absolute cycle position `at`
    pub fn section_at(&self, at: Rational) -> Option<(usize, &Section)> {
        let idx = self.starts.partition_point(|&start| start <= at);
        if idx == 0 || at >= self.length {
            return None;
        }
        Some((idx - 1, &self.sections[idx - 1]))
    }

    /// Events with onset in `span`, sorted by onset.
    pub fn query(&self, span: TimeSpan) -> Vec<Event> {
        let mut events = Vec::new();
        for (start, section) in self.sections() {
            let placed = TimeSpan::new(start, start + section.length());
            let Some(overlap) = placed.intersect(&span) else {
                continue;
            };
            events.extend(
                section
                    .query(overlap.shift(-start))
                    .into_iter()
                    .map(|event| event.shifted(start)),
            );
        }
        events
    }

    /// Like `query`, but the timeline repeats forever.
    ///
    /// Onsets stay on the unwrapped axis, so the second pass through a
    /// 11-cycle timeline starts at cycle 11.
    pub fn query_looped(&self, span: TimeSpan) -> Vec<Event> {
        if self.length.is_zero() || span.is_empty() {
            return Vec::new();
        }
        let mut events = Vec::new();
        let mut pass = (span.begin / self.length).floor();
        loop {
            let offset = Rational::from_integer(pass) * self.length;
            if offset >= span.end {
                break;
            }
            let local = TimeSpan::new(
                (span.begin - offset).max(Rational::ZERO),
                (span.end - offset).min(self.length),
            );
            if !local.is_empty() {
                events.extend(
                    self.query(local)
                        .into_iter()
                        .map(|event| event.shifted(offset)),
                );
            }
            pass += 1;
        }
        events
    }
}

impl From<Section> for Timeline {
    fn from(section: Section) -> Self {
        Timeline::cat([section])
    }
}

impl fmt::Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timeline ({} cycles)", self.length)?;
        for (start, section) in self.sections() {
            write!(f, "\n@{} {}", start, section)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::Layer;

    fn section(src: &str) -> Section {
        Section::stack(vec![Layer::sound(src).unwrap()])
    }

    #[test]
    fn test_cat_concatenation_law() {
        let a = section("bd*4");
        let b = section("~ sn").with_cycles(2);
        let joined = Timeline::cat([a.clone(), b.clone()]);

        assert_eq!(joined.length(), Rational::from_integer(3));

        let mut expected = a.query(TimeSpan::cycles(0, 1));
        expected.extend(
            b.query(TimeSpan::cycles(0, 2))
                .into_iter()
                .map(|e| e.shifted(a.length())),
        );

        assert_eq!(joined.query(TimeSpan::cycles(0, 3)), expected);
    }

    #[test]
    fn test_repeated_sections_are_copies() {
        let intro = section("bd*4");
        let t = Timeline::cat([intro.clone(), intro]);

        let events = t.query(TimeSpan::cycles(0, 2));
        assert_eq!(events.len(), 8);
        assert_eq!(events[4].onset, Rational::ONE);
        assert_eq!(events[4].section, TimeSpan::cycles(1, 2));
    }

    #[test]
    fn test_query_partial_span() {
        let t = Timeline::cat([section("bd*4"), section("hh*2")]);
        let events = t.query(TimeSpan::new(Rational::new(3, 4), Rational::new(3, 2)));

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].onset, Rational::new(3, 4));
        assert_eq!(events[1].onset, Rational::ONE);
    }

    #[test]
    fn test_query_looped_wraps() {
        let t = Timeline::cat([section("bd"), section("sn")]);
        let events = t.query_looped(TimeSpan::new(Rational::ONE, Rational::from_integer(4)));

        let names: Vec<_> = events.iter().map(|e| e.payload.to_string()).collect();
        assert_eq!(names, vec!["sn", "bd", "sn"]);
        assert_eq!(events[1].onset, Rational::from_integer(2));
        assert_eq!(events[2].section, TimeSpan::cycles(3, 4));
    }

    #[test]
    fn test_section_at() {
        let t = Timeline::cat([section("bd"), section("sn").with_cycles(2), section("hh")]);
        assert_eq!(t.section_at(Rational::new(1, 2)).map(|(i, _)| i), Some(0));
        assert_eq!(t.section_at(Rational::new(5, 2)).map(|(i, _)| i), Some(1));
        assert_eq!(t.section_at(Rational::from_integer(3)).map(|(i, _)| i), Some(2));
        assert!(t.section_at(Rational::from_integer(4)).is_none());
    }

    #[test]
    fn test_repeat_and_concat() {
        let t = Timeline::from(section("bd")).repeat(3).concat(section("sn").into());
        assert_eq!(t.length(), Rational::from_integer(4));
        assert_eq!(t.sections().count(), 4);
    }
}
