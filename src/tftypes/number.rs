use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive, Zero};

use super::{AttributePath, Error};

/// An arbitrary-precision number.
///
/// Finite values are exact decimals. The two infinities are representable in
/// MessagePack but not in JSON. NaN is rejected at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    /// A finite decimal.
    Finite(BigDecimal),
    /// Positive infinity.
    PosInfinity,
    /// Negative infinity.
    NegInfinity,
}

impl Number {
    /// The decimal value, if finite.
    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            Number::Finite(d) => Some(d),
            _ => None,
        }
    }

    /// Whether the number is finite and has no fractional part.
    pub fn is_integer(&self) -> bool {
        match self {
            Number::Finite(d) => exponent(&d.normalized()) <= 0,
            _ => false,
        }
    }

    /// The value as an `i64`, if it is an integer in range.
    pub fn as_i64(&self) -> Option<i64> {
        self.machine_integer().and_then(ToPrimitive::to_i64)
    }

    /// The value as a `u64`, if it is a non-negative integer in range.
    pub fn as_u64(&self) -> Option<u64> {
        self.machine_integer().and_then(ToPrimitive::to_u64)
    }

    /// The decimal, if it is an integer of at most 20 digits.
    fn machine_integer(&self) -> Option<&BigDecimal> {
        let d = self.as_decimal()?;
        let normal = d.normalized();
        (exponent(&normal) <= 0 && magnitude(&normal) <= 20).then_some(d)
    }

    /// The closest `f64`. Infinities map to the float infinities.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Number::Finite(d) => d.to_f64(),
            Number::PosInfinity => Some(f64::INFINITY),
            Number::NegInfinity => Some(f64::NEG_INFINITY),
        }
    }

    /// The `f64` holding exactly this value, if one exists.
    pub(crate) fn exact_f64(&self) -> Option<f64> {
        match self {
            Number::Finite(d) => {
                let normal = d.normalized();
                if !normal.is_zero() && !(-330..=310).contains(&magnitude(&normal)) {
                    return None;
                }
                let f = d.to_f64()?;
                if !f.is_finite() {
                    return None;
                }
                let back = BigDecimal::from_str(&f.to_string()).ok()?;
                (back == *d).then_some(f)
            },
            Number::PosInfinity => Some(f64::INFINITY),
            Number::NegInfinity => Some(f64::NEG_INFINITY),
        }
    }

    pub(crate) fn from_f64_at(f: f64, path: &AttributePath) -> Result<Number, Error> {
        Number::try_from(f).map_err(|_| Error::value(path, "NaN is not a valid number"))
    }

    pub(crate) fn parse_at(s: &str, path: &AttributePath) -> Result<Number, Error> {
        s.parse()
            .map_err(|_| Error::value(path, format!("{:?} is not a valid number", s)))
    }
}

/// The decimal exponent: the value is its digits scaled by ten to the minus
/// this.
fn exponent(d: &BigDecimal) -> i64 {
    d.as_bigint_and_exponent().1
}

/// Digits left of the decimal point. Zero or negative below one.
fn magnitude(d: &BigDecimal) -> i64 {
    d.digits() as i64 - exponent(d)
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Finite(BigDecimal::from(v))
    }
}

impl From<i32> for Number {
    fn from(v: i32) -> Self {
        Number::Finite(BigDecimal::from(v))
    }
}

impl From<u64> for Number {
    fn from(v: u64) -> Self {
        Number::Finite(BigDecimal::from(v))
    }
}

impl From<BigDecimal> for Number {
    fn from(v: BigDecimal) -> Self {
        Number::Finite(v)
    }
}

/// The float is converted through its shortest decimal rendering, so `0.1`
/// becomes the decimal `0.1` rather than its binary expansion.
impl TryFrom<f64> for Number {
    type Error = f64;

    fn try_from(f: f64) -> Result<Self, Self::Error> {
        if f.is_nan() {
            return Err(f);
        }
        if f == f64::INFINITY {
            return Ok(Number::PosInfinity);
        }
        if f == f64::NEG_INFINITY {
            return Ok(Number::NegInfinity);
        }
        BigDecimal::from_str(&f.to_string())
            .map(Number::Finite)
            .map_err(|_| f)
    }
}

impl FromStr for Number {
    type Err = bigdecimal::ParseBigDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigDecimal::from_str(s).map(Number::Finite)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Finite(d) => write!(f, "{}", d),
            Number::PosInfinity => f.write_str("+Inf"),
            Number::NegInfinity => f.write_str("-Inf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_accessors() {
        let n = Number::from(42i64);
        assert!(n.is_integer());
        assert_eq!(n.as_i64(), Some(42));
        assert_eq!(n.as_u64(), Some(42));

        let n = Number::from(-7i64);
        assert_eq!(n.as_i64(), Some(-7));
        assert_eq!(n.as_u64(), None);

        let n: Number = "1.5".parse().unwrap();
        assert!(!n.is_integer());
        assert_eq!(n.as_i64(), None);
        assert_eq!(n.as_f64(), Some(1.5));
    }

    #[test]
    fn test_equality_is_numeric() {
        let a: Number = "1.50".parse().unwrap();
        let b: Number = "1.5".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_from_f64() {
        assert_eq!(Number::try_from(0.1).unwrap(), "0.1".parse::<Number>().unwrap());
        assert_eq!(Number::try_from(f64::INFINITY).unwrap(), Number::PosInfinity);
        assert_eq!(
            Number::try_from(f64::NEG_INFINITY).unwrap(),
            Number::NegInfinity
        );
        assert!(Number::try_from(f64::NAN).is_err());
    }

    #[test]
    fn test_exact_f64() {
        assert_eq!("0.25".parse::<Number>().unwrap().exact_f64(), Some(0.25));
        let precise: Number = "3.14159265358979323846264338327950288".parse().unwrap();
        assert_eq!(precise.exact_f64(), None);
    }

    #[test]
    fn test_huge_exponent_is_not_expanded() {
        let huge: Number = "1e2000000".parse().unwrap();
        assert!(huge.is_integer());
        assert_eq!(huge.as_i64(), None);
        assert_eq!(huge.as_u64(), None);
        assert_eq!(huge.exact_f64(), None);

        let tiny: Number = "1e-2000000".parse().unwrap();
        assert!(!tiny.is_integer());
        assert_eq!(tiny.exact_f64(), None);

        let wide: Number = "18446744073709551615".parse().unwrap();
        assert_eq!(wide.as_u64(), Some(u64::MAX));
        assert_eq!(Number::from(0i64).exact_f64(), Some(0.0));
    }

    #[test]
    fn test_large_integers_keep_precision() {
        let big: Number = "123456789012345678901234567890".parse().unwrap();
        assert!(big.is_integer());
        assert_eq!(big.as_i64(), None);
        assert_eq!(big.as_u64(), None);
    }
}
