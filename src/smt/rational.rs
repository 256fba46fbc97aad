//! Exact rational numbers for real-sorted constants
//!
//! Real literals such as `18.1` are kept as `181/10` so that rendering and
//! folding never go through floating point. Numerators and denominators are
//! arbitrary precision.

use std::fmt;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Pow, Signed, Zero};

/// Largest decimal exponent accepted by `parse_decimal`
const MAX_EXPONENT: u32 = 4096;

/// A reduced fraction with a strictly positive denominator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rational(BigRational);

impl Rational {
    /// Create `num / den`, reduced. Returns `None` for a zero denominator.
    pub fn new(num: i64, den: i64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        Some(Rational(BigRational::new(BigInt::from(num), BigInt::from(den))))
    }

    pub fn from_int(value: i64) -> Self {
        Rational(BigRational::from_integer(BigInt::from(value)))
    }

    pub fn zero() -> Self {
        Rational(BigRational::zero())
    }

    pub fn numer(&self) -> &BigInt {
        self.0.numer()
    }

    pub fn denom(&self) -> &BigInt {
        self.0.denom()
    }

    pub fn is_integer(&self) -> bool {
        self.0.is_integer()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Parse a decimal literal: `15`, `18.1`, `-0.25`, `1e3`, `2.5E-2`.
    pub fn parse_decimal(text: &str) -> Option<Self> {
        let text = text.trim().replace('_', "");
        let (mantissa, exponent) = match text.find(['e', 'E']) {
            Some(pos) => (&text[..pos], text[pos + 1..].parse::<i32>().ok()?),
            None => (text.as_str(), 0),
        };
        if exponent.unsigned_abs() > MAX_EXPONENT {
            return None;
        }
        let (negative, mantissa) = match mantissa.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
            return None;
        }

        let digits = format!("{}{}", int_part, frac_part);
        let mut num: BigInt = digits.parse().ok()?;
        let ten = BigInt::from(10u32);
        let mut den: BigInt = Pow::pow(&ten, frac_part.len());
        let scale: BigInt = Pow::pow(&ten, exponent.unsigned_abs());
        if exponent >= 0 {
            num *= scale;
        } else {
            den *= scale;
        }
        if negative {
            num = -num;
        }
        Some(Rational(BigRational::new(num, den)))
    }

    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        Some(Rational(&self.0 + &other.0))
    }

    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        Some(Rational(&self.0 - &other.0))
    }

    pub fn checked_mul(&self, other: &Self) -> Option<Self> {
        Some(Rational(&self.0 * &other.0))
    }

    /// `None` when dividing by zero
    pub fn checked_div(&self, other: &Self) -> Option<Self> {
        if other.0.is_zero() {
            return None;
        }
        Some(Rational(&self.0 / &other.0))
    }

    pub fn checked_neg(&self) -> Option<Self> {
        Some(Rational(-&self.0))
    }
}

/// SMT-LIB rendering, matching what Z3 prints: `15.0`, `(/ 181.0 10.0)`, `(- 2.0)`.
impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.0.numer().abs();
        let body = if self.0.denom().is_one() {
            format!("{}.0", magnitude)
        } else {
            format!("(/ {}.0 {}.0)", magnitude, self.0.denom())
        };
        if self.is_negative() {
            write!(f, "(- {})", body)
        } else {
            f.write_str(&body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Rational::parse_decimal("18.1"), Rational::new(181, 10));
        assert_eq!(Rational::parse_decimal("4.3333"), Rational::new(43333, 10000));
        assert_eq!(Rational::parse_decimal("100.5"), Rational::new(201, 2));
        assert_eq!(Rational::parse_decimal("1e3"), Some(Rational::from_int(1000)));
        assert_eq!(Rational::parse_decimal("2.5E-2"), Rational::new(1, 40));
        assert_eq!(Rational::parse_decimal("-0.25"), Rational::new(-1, 4));
        assert_eq!(Rational::parse_decimal("15."), Some(Rational::from_int(15)));
        assert_eq!(Rational::parse_decimal("abc"), None);
        assert_eq!(Rational::parse_decimal(""), None);
        assert_eq!(Rational::parse_decimal("1e99999"), None);
    }

    #[test]
    fn test_parse_beyond_machine_width() {
        let r = Rational::parse_decimal("0.10000000000000000000001").unwrap();
        assert_eq!(r.denom().to_string(), "100000000000000000000000");
        assert_eq!(r.numer().to_string(), "10000000000000000000001");
        assert_eq!(
            r.to_string(),
            "(/ 10000000000000000000001.0 100000000000000000000000.0)"
        );
    }

    #[test]
    fn test_rendering_matches_z3() {
        assert_eq!(Rational::from_int(314).to_string(), "314.0");
        assert_eq!(Rational::new(181, 10).unwrap().to_string(), "(/ 181.0 10.0)");
        assert_eq!(Rational::from_int(-2).to_string(), "(- 2.0)");
        assert_eq!(Rational::new(-1, 4).unwrap().to_string(), "(- (/ 1.0 4.0))");
    }

    #[test]
    fn test_arithmetic_and_ordering() {
        let a = Rational::new(1, 2).unwrap();
        let b = Rational::new(1, 3).unwrap();
        assert_eq!(a.checked_add(&b), Rational::new(5, 6));
        assert_eq!(a.checked_sub(&b), Rational::new(1, 6));
        assert_eq!(a.checked_mul(&b), Rational::new(1, 6));
        assert_eq!(a.checked_div(&b), Rational::new(3, 2));
        assert_eq!(a.checked_div(&Rational::zero()), None);
        assert!(b < a);
        assert_eq!(Rational::new(2, -4), Rational::new(-1, 2));
    }

    #[test]
    fn test_no_overflow_in_long_products() {
        let seventh = Rational::new(1, 7).unwrap();
        let mut value = Rational::from_int(3);
        for _ in 0..30 {
            value = value.checked_mul(&seventh).unwrap();
        }
        assert_eq!(value.numer().to_string(), "3");
        assert_eq!(value.denom().to_string(), BigInt::from(7u32).pow(30u32).to_string());
    }
}
