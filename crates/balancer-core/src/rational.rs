use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};

/// Exact arbitrary-precision rational used for every flow quantity.
pub type Rational = BigRational;

/// Build `numer / denom`. Panics on a zero denominator.
#[inline]
pub fn ratio(numer: i64, denom: i64) -> Rational {
    Rational::new(BigInt::from(numer), BigInt::from(denom))
}

/// Whole-number rational.
#[inline]
pub fn whole(value: u32) -> Rational {
    Rational::from_integer(BigInt::from(value))
}

/// A count as a rational, for dividing flow evenly.
#[inline]
pub fn from_count(count: usize) -> Rational {
    Rational::from_integer(BigInt::from(count))
}

/// Convert to f64. Use only for display and reports, never in the sim loop.
#[inline]
pub fn to_f64(value: &Rational) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// `content / capacity * 100`.
pub fn percentage(content: &Rational, capacity: &Rational) -> Rational {
    if capacity.is_zero() {
        return Rational::zero();
    }
    content / capacity * whole(100)
}

pub fn sum<'a>(values: impl IntoIterator<Item = &'a Rational>) -> Rational {
    values
        .into_iter()
        .fold(Rational::zero(), |acc, value| acc + value)
}

/// Closeness test `|a-b| <= max(rel * max(|a|, |b|), abs)`, evaluated exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Tolerance {
    pub rel: Rational,
    pub abs: Rational,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rel: ratio(1, 1_000_000),
            abs: Rational::zero(),
        }
    }
}

impl Tolerance {
    pub fn is_close(&self, a: &Rational, b: &Rational) -> bool {
        let diff = (a - b).abs();
        let magnitude = a.abs().max(b.abs());
        let bound = (&self.rel * magnitude).max(self.abs.clone());
        diff <= bound
    }

    /// True when every value is close to the first one.
    pub fn all_close(&self, values: &[Rational]) -> bool {
        match values.split_first() {
            Some((first, rest)) => rest.iter().all(|v| self.is_close(first, v)),
            None => true,
        }
    }
}

/// [`Tolerance::is_close`] with the default tolerance.
pub fn is_close(a: &Rational, b: &Rational) -> bool {
    Tolerance::default().is_close(a, b)
}
