//! Exact rational time measured in cycles.

/*
Cycle Time
==========

Everything in a pattern is positioned in cycles. One cycle is one full pass
through a pattern, so subdivisions quickly produce values like 1/3 or 1/12.
Floating point would accumulate error across a long timeline (a triplet
repeated a few thousand times no longer lands on the beat), so positions are
kept as exact fractions and only converted to seconds at dispatch time.

    "bd*4"        onsets 0, 1/4, 2/4, 3/4
    "[a b c] d"   onsets 0, 1/6, 2/6, 1/2

Vocabulary
----------

  cycle       The fundamental time unit. One pattern = one cycle.

  span        A half-open interval [begin, end) of cycle positions.

  sam         The start of the cycle containing a position (floor).
*/

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// A normalized fraction with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i64,
    den: i64,
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn gcd_wide(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Denominator used when an exact result no longer fits in `i64`
const FALLBACK_DENOMINATOR: i64 = 1 << 30;

impl Rational {
    pub const ZERO: Rational = Rational { num: 0, den: 1 };
    pub const ONE: Rational = Rational { num: 1, den: 1 };

    /// Build `num / den`, reducing to lowest terms.
    ///
    /// Panics if `den` is zero.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "Rational with zero denominator");
        let sign = if den < 0 { -1 } else { 1 };
        let g = gcd(num, den).max(1);
        Self {
            num: sign * num / g,
            den: sign * den / g,
        }
    }

    /// Reduce a wide intermediate result. Results too large for `i64`
    /// are rounded to the nearest `1/2^30` instead of overflowing.
    fn from_wide(num: i128, den: i128) -> Self {
        let sign = if den < 0 { -1 } else { 1 };
        let g = gcd_wide(num, den).max(1);
        let (num, den) = (sign * num / g, sign * den / g);
        match (i64::try_from(num), i64::try_from(den)) {
            (Ok(num), Ok(den)) => Self { num, den },
            _ => Rational::rounded(num as f64 / den as f64),
        }
    }

    /// Nearest fraction over `FALLBACK_DENOMINATOR`, coarser for huge values
    fn rounded(value: f64) -> Self {
        let room = (i64::MAX as f64 / value.abs().max(1.0)) as i64;
        Rational::approximate(value, FALLBACK_DENOMINATOR.min(room).max(1))
    }

    pub fn from_integer(n: i64) -> Self {
        Self { num: n, den: 1 }
    }

    pub fn numer(&self) -> i64 {
        self.num
    }

    pub fn denom(&self) -> i64 {
        self.den
    }

    /// Start of the cycle containing this position.
    pub fn floor(&self) -> i64 {
        self.num.div_euclid(self.den)
    }

    /// Start of the cycle containing this position, as a rational.
    pub fn sam(&self) -> Rational {
        Rational::from_integer(self.floor())
    }

    /// Position within the current cycle, in [0, 1).
    pub fn cycle_pos(&self) -> Rational {
        *self - self.sam()
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Closest fraction to `value` with a denominator no larger than `max_den`.
    ///
    /// Used by the clock to turn wall-clock positions into cycle positions.
    pub fn approximate(value: f64, max_den: i64) -> Self {
        if !value.is_finite() {
            return Rational::ZERO;
        }
        let den = max_den.max(1);
        Rational::new((value * den as f64).floor() as i64, den)
    }

    pub fn min(self, other: Rational) -> Rational {
        if self <= other {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Rational) -> Rational {
        if self >= other {
            self
        } else {
            other
        }
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational::ZERO
    }
}

impl From<i64> for Rational {
    fn from(n: i64) -> Self {
        Rational::from_integer(n)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        // Denominators are positive, so cross-multiplication keeps the order.
        (self.num as i128 * other.den as i128).cmp(&(other.num as i128 * self.den as i128))
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Rational {
    type Output = Rational;
    fn add(self, rhs: Rational) -> Rational {
        let g = gcd(self.den, rhs.den).max(1) as i128;
        let den = self.den as i128 / g * rhs.den as i128;
        let lhs = self.num as i128 * (den / self.den as i128);
        let rhs_num = rhs.num as i128 * (den / rhs.den as i128);
        match lhs.checked_add(rhs_num) {
            Some(num) => Rational::from_wide(num, den),
            None => Rational::rounded(self.to_f64() + rhs.to_f64()),
        }
    }
}

impl AddAssign for Rational {
    fn add_assign(&mut self, rhs: Rational) {
        *self = *self + rhs;
    }
}

impl Sub for Rational {
    type Output = Rational;
    fn sub(self, rhs: Rational) -> Rational {
        self + (-rhs)
    }
}

impl Neg for Rational {
    type Output = Rational;
    fn neg(self) -> Rational {
        Rational {
            num: -self.num,
            den: self.den,
        }
    }
}

impl Mul for Rational {
    type Output = Rational;
    fn mul(self, rhs: Rational) -> Rational {
        let g1 = gcd(self.num, rhs.den).max(1);
        let g2 = gcd(rhs.num, self.den).max(1);
        Rational::from_wide(
            (self.num / g1) as i128 * (rhs.num / g2) as i128,
            (self.den / g2) as i128 * (rhs.den / g1) as i128,
        )
    }
}

impl Div for Rational {
    type Output = Rational;
    fn div(self, rhs: Rational) -> Rational {
        assert!(rhs.num != 0, "division of Rational by zero");
        self * Rational::new(rhs.den, rhs.num)
    }
}

/// Half-open interval of cycle positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSpan {
    pub begin: Rational,
    pub end: Rational,
}

impl TimeSpan {
    pub fn new(begin: Rational, end: Rational) -> Self {
        Self { begin, end }
    }

    /// The span covering whole cycles `[from, to)`.
    pub fn cycles(from: i64, to: i64) -> Self {
        Self::new(Rational::from_integer(from), Rational::from_integer(to))
    }

    pub fn duration(&self) -> Rational {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    pub fn contains(&self, t: Rational) -> bool {
        t >= self.begin && t < self.end
    }

    /// Overlap of two spans, if any.
    pub fn intersect(&self, other: &TimeSpan) -> Option<TimeSpan> {
        let span = TimeSpan::new(self.begin.max(other.begin), self.end.min(other.end));
        if span.is_empty() {
            None
        } else {
            Some(span)
        }
    }

    pub fn shift(&self, by: Rational) -> TimeSpan {
        TimeSpan::new(self.begin + by, self.end + by)
    }

    /// Split the span at every cycle boundary it crosses.
    ///
    /// Each piece lies inside a single cycle, which is what the pattern
    /// queries expect.
    pub fn cycle_pieces(&self) -> Vec<TimeSpan> {
        let mut pieces = Vec::new();
        let mut cursor = self.begin;
        while cursor < self.end {
            let next = (cursor.sam() + Rational::ONE).min(self.end);
            pieces.push(TimeSpan::new(cursor, next));
            cursor = next;
        }
        pieces
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i64, d: i64) -> Rational {
        Rational::new(n, d)
    }

    #[test]
    fn test_normalization() {
        assert_eq!(r(2, 4), r(1, 2));
        assert_eq!(r(3, -6), r(-1, 2));
        assert_eq!(r(0, 5), Rational::ZERO);
        assert_eq!(r(-1, 2).denom(), 2);
    }

    #[test]
    fn test_large_operands_round_instead_of_overflowing() {
        let a = r(1_000_000_007, 1_000_000_000);
        let b = r(1_000_000_003, 999_999_999);
        let product = a * b * a * b;
        assert!((product.to_f64() - a.to_f64().powi(2) * b.to_f64().powi(2)).abs() < 1e-6);

        let sum = r(i64::MAX, 3) + r(i64::MAX, 5);
        let expected = i64::MAX as f64 * 8.0 / 15.0;
        assert!((sum.to_f64() - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(r(1, 3) + r(1, 6), r(1, 2));
        assert_eq!(r(1, 2) - r(3, 4), r(-1, 4));
        assert_eq!(r(2, 3) * r(3, 4), r(1, 2));
        assert_eq!(r(1, 4) / r(1, 2), r(1, 2));
    }

    #[test]
    fn test_ordering() {
        assert!(r(1, 3) < r(1, 2));
        assert!(r(-1, 2) < Rational::ZERO);
        assert_eq!(r(5, 4).max(r(4, 3)), r(4, 3));
    }

    #[test]
    fn test_floor_and_cycle_pos() {
        assert_eq!(r(7, 4).floor(), 1);
        assert_eq!(r(7, 4).cycle_pos(), r(3, 4));
        assert_eq!(r(-1, 4).floor(), -1);
        assert_eq!(r(-1, 4).cycle_pos(), r(3, 4));
    }

    #[test]
    fn test_cycle_pieces() {
        let span = TimeSpan::new(r(1, 2), r(5, 2));
        let pieces = span.cycle_pieces();
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0], TimeSpan::new(r(1, 2), r(1, 1)));
        assert_eq!(pieces[1], TimeSpan::cycles(1, 2));
        assert_eq!(pieces[2], TimeSpan::new(r(2, 1), r(5, 2)));
    }

    #[test]
    fn test_intersect() {
        let a = TimeSpan::cycles(0, 2);
        let b = TimeSpan::new(r(3, 2), r(3, 1));
        assert_eq!(a.intersect(&b), Some(TimeSpan::new(r(3, 2), r(2, 1))));
        assert_eq!(a.intersect(&TimeSpan::cycles(2, 3)), None);
    }

    #[test]
    fn test_approximate() {
        assert_eq!(Rational::approximate(0.5, 1000), r(1, 2));
        assert_eq!(Rational::approximate(f64::NAN, 1000), Rational::ZERO);
    }
}
