//! Recursive-descent parser for the pattern mini-notation.
//!
//! ```text
//! sequence  := term*
//! term      := atom modifier*
//! atom      := word | '~' | '[' stackbody ']' | '<' sequence '>'
//! stackbody := sequence (',' sequence)*
//! modifier  := '*' number | '/' number | '@' number | '!' number?
//! ```
//!
//! Whitespace separates steps. Errors carry the byte span of the offending
//! token so callers can point at it.

use std::ops::Range;

use super::pattern::{PatternSlot, WeightedSlot};
use super::time::Rational;
use crate::error::PatternError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Rest,
    OpenBracket,
    CloseBracket,
    OpenAngle,
    CloseAngle,
    Comma,
    Star,
    Slash,
    At,
    Bang,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    start: usize,
    end: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '#' | '.' | '_' | '-' | ':')
}

fn tokenize(source: &str) -> Result<Vec<Spanned>, PatternError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let single = match c {
            '[' => Some(Token::OpenBracket),
            ']' => Some(Token::CloseBracket),
            '<' => Some(Token::OpenAngle),
            '>' => Some(Token::CloseAngle),
            ',' => Some(Token::Comma),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '@' => Some(Token::At),
            '!' => Some(Token::Bang),
            '~' => Some(Token::Rest),
            _ => None,
        };
        if let Some(token) = single {
            chars.next();
            tokens.push(Spanned {
                token,
                start,
                end: start + c.len_utf8(),
            });
            continue;
        }
        if is_word_char(c) {
            let mut end = start;
            let mut word = String::new();
            while let Some(&(i, c)) = chars.peek() {
                if !is_word_char(c) {
                    break;
                }
                word.push(c);
                end = i + c.len_utf8();
                chars.next();
            }
            tokens.push(Spanned {
                token: Token::Word(word),
                start,
                end,
            });
            continue;
        }
        return Err(PatternError::syntax(
            format!("unexpected character '{}'", c),
            start..start + c.len_utf8(),
        ));
    }

    Ok(tokens)
}

/// Largest `*`, `/`, `@` or `!` amount
pub const MAX_MODIFIER: i64 = 1024;

/// Finest fraction a modifier amount may use, so nested modifiers stay exact
pub const MAX_MODIFIER_DENOMINATOR: i64 = 1000;

/// Parse a decimal such as `4`, `0.5` or `1.25` into an exact fraction.
pub fn parse_decimal(text: &str) -> Option<Rational> {
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
        || frac_part.len() > 9
    {
        return None;
    }
    let int: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    let scale = 10i64.pow(frac_part.len() as u32);
    let frac: i64 = if frac_part.is_empty() {
        0
    } else {
        frac_part.parse().ok()?
    };
    Some(Rational::new(int.checked_mul(scale)? + frac, scale))
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn end_span(&self) -> Range<usize> {
        self.source.len()..self.source.len()
    }

    /// Parse terms until a closing token (not consumed) or end of input
    fn parse_sequence(&mut self) -> Result<Vec<WeightedSlot>, PatternError> {
        let mut slots: Vec<WeightedSlot> = Vec::new();

        while let Some(tok) = self.peek() {
            match tok.token {
                Token::CloseBracket | Token::CloseAngle | Token::Comma => break,
                Token::Bang => {
                    // A bare `!` repeats the previous term
                    let tok = self.next().ok_or_else(|| self.eof("'!'"))?;
                    let prev = slots.last().cloned().ok_or_else(|| {
                        PatternError::syntax("'!' with nothing to repeat", tok.start..tok.end)
                    })?;
                    slots.push(prev);
                }
                _ => {
                    let (slot, replicate) = self.parse_term()?;
                    for _ in 0..replicate {
                        slots.push(slot.clone());
                    }
                }
            }
        }

        Ok(slots)
    }

    fn eof(&self, expected: &str) -> PatternError {
        PatternError::syntax(format!("expected {}, found end of pattern", expected), self.end_span())
    }

    fn parse_term(&mut self) -> Result<(WeightedSlot, usize), PatternError> {
        let mut slot = WeightedSlot::new(self.parse_atom()?);
        let mut replicate = 1usize;

        while let Some(tok) = self.peek() {
            let op = tok.token.clone();
            let op_span = tok.start..tok.end;
            match op {
                Token::Star | Token::Slash | Token::At => {
                    self.next();
                    let amount = self.parse_number(&op_span)?;
                    match op {
                        Token::Star => {
                            slot.slot = PatternSlot::Fast(Box::new(slot.slot), amount);
                        }
                        Token::Slash => {
                            slot.slot =
                                PatternSlot::Fast(Box::new(slot.slot), Rational::ONE / amount);
                        }
                        _ => slot.weight = amount,
                    }
                }
                Token::Bang => {
                    // `!n` directly after a term replicates it; a spaced `!` is
                    // handled by the sequence loop.
                    let glued = self
                        .peek_next_word_glued()
                        .and_then(|w| w.parse::<usize>().ok());
                    match glued {
                        Some(n) => {
                            self.next();
                            let num = self.next().ok_or_else(|| self.eof("a number"))?;
                            if n == 0 {
                                return Err(PatternError::syntax(
                                    "replication count must be at least 1",
                                    num.start..num.end,
                                ));
                            }
                            replicate = n;
                        }
                        None => break,
                    }
                }
                Token::Word(_) | Token::Rest | Token::OpenBracket | Token::OpenAngle => break,
                Token::CloseBracket | Token::CloseAngle | Token::Comma => break,
            }
        }

        Ok((slot, replicate))
    }

    /// The word right after a `!` if it touches it (`bd!3`)
    fn peek_next_word_glued(&self) -> Option<&str> {
        let bang = self.tokens.get(self.pos)?;
        let next = self.tokens.get(self.pos + 1)?;
        match &next.token {
            Token::Word(w) if next.start == bang.end => Some(w.as_str()),
            _ => None,
        }
    }

    fn parse_number(&mut self, op_span: &Range<usize>) -> Result<Rational, PatternError> {
        let tok = self
            .next()
            .ok_or_else(|| PatternError::syntax("modifier is missing its number", op_span.clone()))?;
        let value = match &tok.token {
            Token::Word(w) => parse_decimal(w),
            _ => None,
        };
        let text = &self.source[tok.start..tok.end];
        match value {
            Some(v) if v.is_zero() => Err(PatternError::syntax(
                format!("invalid modifier amount '{}'", text),
                tok.start..tok.end,
            )),
            Some(v) if v.denom() > MAX_MODIFIER_DENOMINATOR || v > Rational::from_integer(MAX_MODIFIER) => {
                Err(PatternError::syntax(
                    format!(
                        "modifier amount '{}' out of range (up to {}, in steps of 1/{} or coarser)",
                        text, MAX_MODIFIER, MAX_MODIFIER_DENOMINATOR
                    ),
                    tok.start..tok.end,
                ))
            }
            Some(v) => Ok(v),
            None => Err(PatternError::syntax(
                format!("invalid modifier amount '{}'", text),
                tok.start..tok.end,
            )),
        }
    }

    fn parse_atom(&mut self) -> Result<PatternSlot, PatternError> {
        let tok = self.next().ok_or_else(|| self.eof("a step"))?;
        match tok.token {
            Token::Word(w) => Ok(PatternSlot::Step(w)),
            Token::Rest => Ok(PatternSlot::Rest),
            Token::OpenBracket => {
                let mut layers = vec![self.parse_group(tok.start..tok.end)?];
                while matches!(self.peek().map(|t| &t.token), Some(Token::Comma)) {
                    self.next();
                    layers.push(self.parse_group(tok.start..tok.end)?);
                }
                self.expect_close(Token::CloseBracket, ']', tok.start)?;
                if layers.len() == 1 {
                    Ok(layers.remove(0))
                } else {
                    Ok(PatternSlot::Stack(layers))
                }
            }
            Token::OpenAngle => {
                let children = self.parse_sequence()?;
                if children.is_empty() {
                    return Err(PatternError::syntax("empty alternation '<>'", tok.start..tok.end));
                }
                self.expect_close(Token::CloseAngle, '>', tok.start)?;
                Ok(PatternSlot::Alternate(
                    children.into_iter().map(|c| c.slot).collect(),
                ))
            }
            Token::Star | Token::Slash | Token::At | Token::Bang => Err(PatternError::syntax(
                format!(
                    "modifier '{}' has nothing to modify",
                    &self.source[tok.start..tok.end]
                ),
                tok.start..tok.end,
            )),
            Token::CloseBracket | Token::CloseAngle | Token::Comma => Err(PatternError::syntax(
                format!("unexpected '{}'", &self.source[tok.start..tok.end]),
                tok.start..tok.end,
            )),
        }
    }

    fn parse_group(&mut self, open: Range<usize>) -> Result<PatternSlot, PatternError> {
        let children = self.parse_sequence()?;
        if children.is_empty() {
            return Err(PatternError::syntax("empty group", open));
        }
        Ok(PatternSlot::Sequence(children))
    }

    fn expect_close(&mut self, want: Token, symbol: char, open_at: usize) -> Result<(), PatternError> {
        match self.next() {
            Some(tok) if tok.token == want => Ok(()),
            Some(tok) => Err(PatternError::syntax(
                format!(
                    "expected '{}', found '{}'",
                    symbol,
                    &self.source[tok.start..tok.end]
                ),
                tok.start..tok.end,
            )),
            None => Err(PatternError::syntax(
                format!("unclosed group, missing '{}'", symbol),
                open_at..open_at + 1,
            )),
        }
    }
}

/// Parse a mini-notation string into a pattern tree.
/// Step words of `source` with their byte spans, in source order.
///
/// Words that are modifier amounts (`4` in `bd*4`, `3` in `bd!3`) are left
/// out.
pub fn step_words(source: &str) -> Result<Vec<(Range<usize>, String)>, PatternError> {
    let tokens = tokenize(source)?;
    let mut words = Vec::new();
    for (i, tok) in tokens.iter().enumerate() {
        let Token::Word(word) = &tok.token else {
            continue;
        };
        let is_amount = match i.checked_sub(1).map(|p| &tokens[p]) {
            Some(prev) => match prev.token {
                Token::Star | Token::Slash | Token::At => true,
                Token::Bang => prev.end == tok.start,
                _ => false,
            },
            None => false,
        };
        if !is_amount {
            words.push((tok.start..tok.end, word.clone()));
        }
    }
    Ok(words)
}

pub fn parse_pattern(source: &str) -> Result<PatternSlot, PatternError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };

    let slots = parser.parse_sequence()?;
    if let Some(tok) = parser.next() {
        return Err(PatternError::syntax(
            format!("unbalanced '{}'", &source[tok.start..tok.end]),
            tok.start..tok.end,
        ));
    }

    if slots.is_empty() {
        return Ok(PatternSlot::Rest);
    }
    Ok(PatternSlot::Sequence(slots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencing::pattern::Pattern;

    fn r(n: i64, d: i64) -> Rational {
        Rational::new(n, d)
    }

    fn span_of(err: PatternError) -> Range<usize> {
        match err {
            PatternError::Syntax { span, .. } => span,
        }
    }

    #[test]
    fn test_bd_times_four() {
        let p = Pattern::parse("bd*4").unwrap();
        let haps = p.query_cycle(0);

        assert_eq!(haps.len(), 4);
        for (i, hap) in haps.iter().enumerate() {
            assert_eq!(hap.value.as_deref(), Some("bd"));
            assert_eq!(hap.onset, r(i as i64, 4));
            assert_eq!(hap.duration, r(1, 4));
        }
    }

    #[test]
    fn test_rest_then_snare() {
        let p = Pattern::parse("~ sn").unwrap();
        let haps = p.query_cycle(0);

        assert_eq!(haps.len(), 2);
        assert!(haps[0].is_rest());
        assert_eq!(haps[0].duration, r(1, 2));
        assert_eq!(haps[1].value.as_deref(), Some("sn"));
        assert_eq!(haps[1].onset, r(1, 2));
        assert_eq!(haps[1].duration, r(1, 2));
    }

    #[test]
    fn test_bass_line_with_groups() {
        let p = Pattern::parse("c2 [c2 g1] f1 [g1 g#1]").unwrap();
        let haps = p.query_cycle(0);
        let tokens: Vec<_> = haps.iter().filter_map(|h| h.value.as_deref()).collect();

        assert_eq!(tokens, vec!["c2", "c2", "g1", "f1", "g1", "g#1"]);
        assert_eq!(haps[5].onset, r(7, 8));
        assert_eq!(haps[5].duration, r(1, 8));
    }

    #[test]
    fn test_durations_sum_to_one_cycle() {
        for src in [
            "bd*4",
            "~ sn",
            "hh*16",
            "c2 [c2 g1] f1 [g1 g#1]",
            "a [b [c d]] ~ e@3",
            "<a b> [c d]*3 e!2",
            "c4*8",
        ] {
            let p = Pattern::parse(src).unwrap();
            for cycle in 0..3 {
                let total = p
                    .query_cycle(cycle)
                    .iter()
                    .fold(Rational::ZERO, |acc, h| acc + h.duration);
                assert_eq!(total, Rational::ONE, "pattern {:?} cycle {}", src, cycle);
            }
        }
    }

    #[test]
    fn test_chord_group() {
        let p = Pattern::parse("[c3, e3 g3]").unwrap();
        let haps = p.query_cycle(0);

        assert_eq!(haps.len(), 3);
        assert_eq!(haps[0].duration, Rational::ONE);
        assert!(haps.iter().any(|h| h.value.as_deref() == Some("g3") && h.onset == r(1, 2)));
    }

    #[test]
    fn test_alternation() {
        let p = Pattern::parse("bd <sn cp>").unwrap();
        assert_eq!(p.query_cycle(0)[1].value.as_deref(), Some("sn"));
        assert_eq!(p.query_cycle(1)[1].value.as_deref(), Some("cp"));
    }

    #[test]
    fn test_weight_and_replicate() {
        let p = Pattern::parse("a@3 b").unwrap();
        let haps = p.query_cycle(0);
        assert_eq!(haps[0].duration, r(3, 4));

        let p = Pattern::parse("a!3 b").unwrap();
        assert_eq!(p.query_cycle(0).len(), 4);

        let p = Pattern::parse("a ! b").unwrap();
        let tokens: Vec<_> = p.query_cycle(0).into_iter().filter_map(|h| h.value).collect();
        assert_eq!(tokens, vec!["a", "a", "b"]);
    }

    #[test]
    fn test_slow_modifier() {
        let p = Pattern::parse("bd/2").unwrap();
        assert_eq!(p.query_cycle(0).len(), 1);
        assert!(p.query_cycle(1).is_empty());
    }

    #[test]
    fn test_fractional_speed() {
        let p = Pattern::parse("bd*1.5").unwrap();
        // Inner cycles 0..1.5: one onset at 0, one at 2/3
        let haps = p.query_cycle(0);
        assert_eq!(haps.len(), 2);
        assert_eq!(haps[1].onset, r(2, 3));
    }

    #[test]
    fn test_empty_pattern_is_silence() {
        let p = Pattern::parse("   ").unwrap();
        assert!(p.query_cycle(0).iter().all(|h| h.is_rest()));
    }

    #[test]
    fn test_unbalanced_open_bracket() {
        let err = Pattern::parse("bd [sn sn").unwrap_err();
        assert_eq!(span_of(err), 3..4);
    }

    #[test]
    fn test_unbalanced_close_bracket() {
        let err = Pattern::parse("bd sn]").unwrap_err();
        assert_eq!(span_of(err), 5..6);
    }

    #[test]
    fn test_mismatched_brackets() {
        let err = Pattern::parse("[bd sn>").unwrap_err();
        assert_eq!(span_of(err), 6..7);
    }

    #[test]
    fn test_unknown_modifier() {
        let err = Pattern::parse("bd % 2").unwrap_err();
        assert_eq!(span_of(err), 3..4);
        assert!(err_message("bd % 2").contains("unexpected character"));
    }

    #[test]
    fn test_bad_modifier_amount() {
        let err = Pattern::parse("bd*x").unwrap_err();
        assert_eq!(span_of(err), 3..4);

        let err = Pattern::parse("bd*0").unwrap_err();
        assert_eq!(span_of(err), 3..4);

        let err = Pattern::parse("bd*").unwrap_err();
        assert_eq!(span_of(err), 2..3);
    }

    #[test]
    fn test_modifier_precision_is_bounded() {
        let src = "[[a*1.000000001]*1.000000003]*1.000000007";
        let err = Pattern::parse(src).unwrap_err();
        assert_eq!(span_of(err), 4..15);
        assert!(err_message(src).contains("out of range"));

        let err = Pattern::parse("bd*2000").unwrap_err();
        assert_eq!(span_of(err), 3..7);
    }

    #[test]
    fn test_nested_decimal_modifiers_query_exactly() {
        let pattern = Pattern::parse("[[a*1.001]*1.003]*1.007").unwrap();
        for cycle in [0, 5, 1_000] {
            let haps = pattern.query_cycle(cycle);
            assert!(!haps.is_empty());
            assert!(haps.iter().all(|h| h.onset.floor() == cycle));
        }
    }

    #[test]
    fn test_dangling_modifier() {
        let err = Pattern::parse("*4").unwrap_err();
        assert_eq!(span_of(err), 0..1);
    }

    #[test]
    fn test_empty_groups() {
        assert!(Pattern::parse("bd []").is_err());
        assert!(Pattern::parse("<>").is_err());
    }

    #[test]
    fn test_step_words_skip_modifier_amounts() {
        let words = step_words("bd*4 [sn!2 hh] ~ cp@3 g#1 #1").unwrap();
        let found: Vec<_> = words.iter().map(|(span, w)| (span.clone(), w.as_str())).collect();
        assert_eq!(
            found,
            vec![
                (0..2, "bd"),
                (6..8, "sn"),
                (11..13, "hh"),
                (17..19, "cp"),
                (22..25, "g#1"),
                (26..28, "#1"),
            ]
        );
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("4"), Some(r(4, 1)));
        assert_eq!(parse_decimal("0.25"), Some(r(1, 4)));
        assert_eq!(parse_decimal(".5"), Some(r(1, 2)));
        assert_eq!(parse_decimal("1.2.3"), None);
        assert_eq!(parse_decimal("g#1"), None);
    }

    fn err_message(src: &str) -> String {
        Pattern::parse(src).unwrap_err().to_string()
    }
}
