/*
Pattern Trees
=============

A pattern describes exactly one cycle of music. Timing is implicit: a group
of k children divides its span into k equal parts, unless the children carry
weights. Brackets in the mini-notation create smaller groups inside a slot.

Example mental model:
    bd sn bd sn         = 4 steps, 1/4 cycle each
    bd [sn sn] ~ sn     = 1/4, two 1/8s, a 1/4 rest, 1/4
    [c2, g2]            = both notes over the whole cycle (chord)
    <bd sn>             = bd in even cycles, sn in odd cycles
    bd*4                = bd repeated 4 times inside its slot
    bd/2                = bd stretched over 2 cycles (sounds every other cycle)

This module provides:
- `PatternSlot` - A node of the tree: step, rest, or a kind of group
- `Pattern` - The root slot plus the source it was parsed from
- `Hap` - One flattened step with its onset and duration in cycles
- Flattening (`query_cycle`, `query`) used by the composer and the scheduler
*/

use std::fmt;
use std::str::FromStr;

use super::parser::parse_pattern;
use super::time::{Rational, TimeSpan};
use crate::error::PatternError;

/// A node in a pattern tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternSlot {
    /// A symbolic token: a sample name, note name or number
    Step(String),
    /// Silence for this slot
    Rest,
    /// Children played one after another, splitting the span by weight
    Sequence(Vec<WeightedSlot>),
    /// Children played at the same time, each over the whole span
    Stack(Vec<PatternSlot>),
    /// One child per cycle, chosen by cycle number
    Alternate(Vec<PatternSlot>),
    /// The child runs `factor` cycles per span (`*n`, and `/n` as `1/n`)
    Fast(Box<PatternSlot>, Rational),
}

/// A child of a sequential group with its relative weight (`@w`).
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedSlot {
    pub slot: PatternSlot,
    pub weight: Rational,
}

impl WeightedSlot {
    pub fn new(slot: PatternSlot) -> Self {
        Self {
            slot,
            weight: Rational::ONE,
        }
    }

    pub fn with_weight(mut self, weight: Rational) -> Self {
        self.weight = weight;
        self
    }
}

impl From<PatternSlot> for WeightedSlot {
    fn from(slot: PatternSlot) -> Self {
        WeightedSlot::new(slot)
    }
}

impl From<&str> for PatternSlot {
    fn from(token: &str) -> Self {
        if token == "~" {
            PatternSlot::Rest
        } else {
            PatternSlot::Step(token.to_string())
        }
    }
}

/// One flattened step of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hap {
    /// Absolute onset in cycles
    pub onset: Rational,
    /// Length in cycles
    pub duration: Rational,
    /// Token for this step (None = rest)
    pub value: Option<String>,
}

impl Hap {
    pub fn is_rest(&self) -> bool {
        self.value.is_none()
    }

    pub fn end(&self) -> Rational {
        self.onset + self.duration
    }
}

/// A parsed pattern: one cycle of music.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    root: PatternSlot,
    source: Option<String>,
}

impl Pattern {
    /// Wrap an already built tree
    pub fn new(root: PatternSlot) -> Self {
        Self { root, source: None }
    }

    /// Parse a mini-notation string
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        let root = parse_pattern(source)?;
        Ok(Self {
            root,
            source: Some(source.to_string()),
        })
    }

    /// A pattern with no steps at all (one silent cycle)
    pub fn silence() -> Self {
        Self::new(PatternSlot::Rest)
    }

    pub fn root(&self) -> &PatternSlot {
        &self.root
    }

    /// The mini-notation this pattern was parsed from, if any
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Flatten one full cycle, rests included, in onset order.
    pub fn query_cycle(&self, cycle: i64) -> Vec<Hap> {
        let span = TimeSpan::cycles(cycle, cycle + 1);
        let mut haps = Vec::new();
        expand_slot(&self.root, span, cycle, &mut haps);
        haps.retain(|h| span.contains(h.onset));
        haps.sort_by(|a, b| a.onset.cmp(&b.onset));
        haps
    }

    /// All sounding steps whose onset lies in `span`.
    pub fn query(&self, span: TimeSpan) -> Vec<Hap> {
        let mut haps = Vec::new();
        for piece in span.cycle_pieces() {
            haps.extend(
                self.query_cycle(piece.begin.floor())
                    .into_iter()
                    .filter(|h| !h.is_rest() && piece.contains(h.onset)),
            );
        }
        haps
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::parse(s)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "\"{}\"", src),
            None => write!(f, "{:?}", self.root),
        }
    }
}

/// Recursively expand a slot over `span`, seen from cycle `cycle`
fn expand_slot(slot: &PatternSlot, span: TimeSpan, cycle: i64, haps: &mut Vec<Hap>) {
    match slot {
        PatternSlot::Step(token) => haps.push(Hap {
            onset: span.begin,
            duration: span.duration(),
            value: Some(token.clone()),
        }),
        PatternSlot::Rest => haps.push(Hap {
            onset: span.begin,
            duration: span.duration(),
            value: None,
        }),
        PatternSlot::Sequence(children) => {
            if children.is_empty() {
                return;
            }
            let total = children
                .iter()
                .fold(Rational::ZERO, |acc, c| acc + c.weight);
            let mut cursor = span.begin;
            for child in children {
                let len = span.duration() * child.weight / total;
                expand_slot(&child.slot, TimeSpan::new(cursor, cursor + len), cycle, haps);
                cursor += len;
            }
        }
        PatternSlot::Stack(children) => {
            for child in children {
                expand_slot(child, span, cycle, haps);
            }
        }
        PatternSlot::Alternate(children) => {
            if children.is_empty() {
                return;
            }
            let idx = cycle.rem_euclid(children.len() as i64) as usize;
            expand_slot(&children[idx], span, cycle, haps);
        }
        PatternSlot::Fast(child, factor) => expand_fast(child, *factor, span, cycle, haps),
    }
}

/// Expand a child running `factor` inner cycles per outer span.
///
/// Inner cycle k is mapped onto the outer timeline; only steps whose onset
/// falls inside `span` are kept, and their ends are clipped to it.
fn expand_fast(
    child: &PatternSlot,
    factor: Rational,
    span: TimeSpan,
    cycle: i64,
    haps: &mut Vec<Hap>,
) {
    let outer = span.duration();
    let inner_begin = Rational::from_integer(cycle) * factor;
    let inner_end = Rational::from_integer(cycle + 1) * factor;
    let inner_len = outer / factor;

    let mut k = inner_begin.floor();
    while Rational::from_integer(k) < inner_end {
        let begin = span.begin + (Rational::from_integer(k) - inner_begin) / factor * outer;
        let mut inner = Vec::new();
        expand_slot(child, TimeSpan::new(begin, begin + inner_len), k, &mut inner);
        for mut hap in inner {
            if span.contains(hap.onset) {
                if hap.end() > span.end {
                    hap.duration = span.end - hap.onset;
                }
                haps.push(hap);
            }
        }
        k += 1;
    }
}

/// Macro for building pattern trees in code
///
/// Identifiers become steps, `_` is a rest, brackets subdivide.
///
/// # Examples
///
/// ```
/// use saavy_cycles::pattern;
///
/// let beat = pattern!(bd, _, [sn, sn], hh);
/// assert_eq!(beat.query_cycle(0).len(), 5);
/// ```
#[macro_export]
macro_rules! pattern {
    // Rest slot
    (@slot _) => {
        $crate::sequencing::PatternSlot::Rest
    };

    // Subdivision slot (brackets)
    (@slot [$($inner:tt),* $(,)?]) => {
        $crate::sequencing::PatternSlot::Sequence(
            vec![$($crate::sequencing::WeightedSlot::new($crate::pattern!(@slot $inner))),*]
        )
    };

    // Step slot
    (@slot $token:ident) => {
        $crate::sequencing::PatternSlot::Step(stringify!($token).to_string())
    };

    ($($slot:tt),* $(,)?) => {
        $crate::sequencing::Pattern::new(
            $crate::sequencing::PatternSlot::Sequence(
                vec![$($crate::sequencing::WeightedSlot::new($crate::pattern!(@slot $slot))),*]
            )
        )
    };
}

// Re-export the macro at the module level
pub use pattern;

/// Helper functions for building pattern slots
pub mod slot {
    use super::*;

    /// A symbolic step
    pub fn step(token: &str) -> PatternSlot {
        PatternSlot::Step(token.to_string())
    }

    pub fn rest() -> PatternSlot {
        PatternSlot::Rest
    }

    /// Equal-weight subdivision
    pub fn seq(slots: Vec<PatternSlot>) -> PatternSlot {
        PatternSlot::Sequence(slots.into_iter().map(WeightedSlot::new).collect())
    }

    /// Weighted step inside a subdivision
    pub fn weighted(slot: PatternSlot, weight: i64) -> WeightedSlot {
        WeightedSlot::new(slot).with_weight(Rational::from_integer(weight))
    }

    pub fn chord(slots: Vec<PatternSlot>) -> PatternSlot {
        PatternSlot::Stack(slots)
    }

    pub fn alt(slots: Vec<PatternSlot>) -> PatternSlot {
        PatternSlot::Alternate(slots)
    }

    pub fn fast(slot: PatternSlot, factor: i64) -> PatternSlot {
        PatternSlot::Fast(Box::new(slot), Rational::from_integer(factor))
    }

    pub fn slow(slot: PatternSlot, factor: i64) -> PatternSlot {
        PatternSlot::Fast(Box::new(slot), Rational::new(1, factor))
    }
}

#[cfg(test)]
mod tests {
    use super::slot::*;
    use super::*;

    fn r(n: i64, d: i64) -> Rational {
        Rational::new(n, d)
    }

    fn values(haps: &[Hap]) -> Vec<Option<&str>> {
        haps.iter().map(|h| h.value.as_deref()).collect()
    }

    #[test]
    fn test_simple_four_step_pattern() {
        let p = Pattern::new(seq(vec![step("bd"), step("sn"), step("bd"), step("sn")]));
        let haps = p.query_cycle(0);

        assert_eq!(haps.len(), 4);
        assert_eq!(haps[0].onset, Rational::ZERO);
        assert_eq!(haps[1].onset, r(1, 4));
        assert_eq!(haps[2].onset, r(1, 2));
        assert_eq!(haps[3].onset, r(3, 4));
        assert!(haps.iter().all(|h| h.duration == r(1, 4)));
    }

    #[test]
    fn test_rests_consume_time() {
        let p = Pattern::new(seq(vec![rest(), step("sn")]));
        let haps = p.query_cycle(0);

        assert_eq!(values(&haps), vec![None, Some("sn")]);
        assert_eq!(haps[1].onset, r(1, 2));

        // Rests are not returned by span queries
        let sounding = p.query(TimeSpan::cycles(0, 1));
        assert_eq!(sounding.len(), 1);
    }

    #[test]
    fn test_subdivision() {
        let p = Pattern::new(seq(vec![
            step("c2"),
            seq(vec![step("c2"), step("g1")]),
            step("f1"),
            seq(vec![step("g1"), step("g#1")]),
        ]));
        let haps = p.query_cycle(0);

        assert_eq!(haps.len(), 6);
        assert_eq!(haps[1].onset, r(1, 4));
        assert_eq!(haps[1].duration, r(1, 8));
        assert_eq!(haps[2].onset, r(3, 8));
        assert_eq!(haps[5].onset, r(7, 8));
    }

    #[test]
    fn test_weights() {
        let p = Pattern::new(PatternSlot::Sequence(vec![
            weighted(step("a"), 2),
            weighted(step("b"), 1),
        ]));
        let haps = p.query_cycle(0);

        assert_eq!(haps[0].duration, r(2, 3));
        assert_eq!(haps[1].onset, r(2, 3));
        assert_eq!(haps[1].duration, r(1, 3));
    }

    #[test]
    fn test_chord_spans_whole_slot() {
        let p = Pattern::new(seq(vec![chord(vec![step("c3"), step("e3")]), step("g3")]));
        let haps = p.query_cycle(0);

        assert_eq!(haps.len(), 3);
        assert_eq!(haps[0].onset, Rational::ZERO);
        assert_eq!(haps[1].onset, Rational::ZERO);
        assert_eq!(haps[0].duration, r(1, 2));
    }

    #[test]
    fn test_alternation_by_cycle() {
        let p = Pattern::new(seq(vec![step("bd"), alt(vec![step("sn"), step("cp")])]));

        assert_eq!(values(&p.query_cycle(0)), vec![Some("bd"), Some("sn")]);
        assert_eq!(values(&p.query_cycle(1)), vec![Some("bd"), Some("cp")]);
        assert_eq!(values(&p.query_cycle(2)), vec![Some("bd"), Some("sn")]);
    }

    #[test]
    fn test_fast_repeats_in_slot() {
        let p = Pattern::new(fast(step("hh"), 8));
        let haps = p.query_cycle(3);

        assert_eq!(haps.len(), 8);
        assert_eq!(haps[0].onset, r(3, 1));
        assert_eq!(haps[7].onset, r(3, 1) + r(7, 8));
        assert!(haps.iter().all(|h| h.duration == r(1, 8)));
    }

    #[test]
    fn test_fast_alternation_advances() {
        // <a b>*2 plays a then b inside one cycle
        let p = Pattern::new(fast(alt(vec![step("a"), step("b")]), 2));
        assert_eq!(values(&p.query_cycle(0)), vec![Some("a"), Some("b")]);
    }

    #[test]
    fn test_slow_sounds_every_other_cycle() {
        let p = Pattern::new(slow(step("bd"), 2));

        let even = p.query_cycle(0);
        assert_eq!(even.len(), 1);
        assert_eq!(even[0].duration, Rational::ONE);
        assert!(p.query_cycle(1).is_empty());
        assert_eq!(p.query_cycle(2).len(), 1);
    }

    #[test]
    fn test_query_across_cycles() {
        let p = Pattern::new(seq(vec![step("bd"), step("sn")]));
        let haps = p.query(TimeSpan::new(r(1, 2), r(5, 2)));

        assert_eq!(haps.len(), 4);
        assert_eq!(haps[0].onset, r(1, 2));
        assert_eq!(haps[3].onset, r(2, 1));
    }

    #[test]
    fn test_silence() {
        let p = Pattern::silence();
        assert!(p.query(TimeSpan::cycles(0, 4)).is_empty());
        assert_eq!(p.query_cycle(0).len(), 1);
    }

    #[test]
    fn test_pattern_macro() {
        let p = pattern!(bd, _, [sn, sn], hh);
        let haps = p.query_cycle(0);

        assert_eq!(
            values(&haps),
            vec![Some("bd"), None, Some("sn"), Some("sn"), Some("hh")]
        );
        assert_eq!(haps[2].duration, r(1, 8));
    }

    #[test]
    fn test_pattern_macro_trailing_comma() {
        let p = pattern!(bd, sn,);
        assert_eq!(p.query_cycle(0).len(), 2);
    }
}
