//! Exact quotient arithmetic.
//!
//! All quotients and divisors are exact rationals. Decimal rendering only
//! happens at the output edge via [`to_decimal_string`].

use num::{BigInt, BigRational, One, Signed, Zero};

/// Exact rational number used for quotients, voter numbers and divisors.
pub type Rational = BigRational;

pub fn from_u64(n: u64) -> Rational {
    Rational::from_integer(BigInt::from(n))
}

pub fn ratio(numer: u64, denom: u64) -> Rational {
    Rational::new(BigInt::from(numer), BigInt::from(denom))
}

pub fn one_half() -> Rational {
    ratio(1, 2)
}

/// `vote_count / (mandates + 1)`.
pub fn quotient(vote_count: u64, mandates: u64) -> Rational {
    ratio(vote_count, mandates + 1)
}

/// Smallest integer strictly above `q`: an exact integer rounds up by one.
pub fn distribution_number(q: &Rational) -> BigInt {
    q.floor().to_integer() + BigInt::one()
}

/// What remains of `q` after subtracting `distribution_number(q) - 1`.
pub fn quotient_remainder(q: &Rational) -> Rational {
    q - Rational::from_integer(distribution_number(q) - BigInt::one())
}

/// Standard rounding, half up. Only defined for non-negative values.
pub fn round_half_up(q: &Rational) -> BigInt {
    (q + one_half()).floor().to_integer()
}

/// Simplest fraction strictly between `lower` and `upper`: smallest
/// denominator, then smallest numerator. Requires `0 <= lower < upper`.
pub fn simplest_between(lower: &Rational, upper: &Rational) -> Rational {
    let floor = lower.floor();
    let next = &floor + Rational::one();
    if &next < upper {
        return next;
    }
    // both ends share the integer part; continue on the reciprocals
    let lo = lower - &floor;
    let hi = upper - &floor;
    let inverse = if lo.is_zero() {
        hi.recip().floor() + Rational::one()
    } else {
        simplest_between(&hi.recip(), &lo.recip())
    };
    floor + inverse.recip()
}

/// Converts an integer that is known to fit, saturating otherwise.
pub fn to_u64(n: &BigInt) -> u64 {
    u64::try_from(n).unwrap_or(if n.is_negative() { 0 } else { u64::MAX })
}

/// Renders `q` with `places` decimals, rounded half up.
pub fn to_decimal_string(q: &Rational, places: u32) -> String {
    let negative = q.is_negative();
    let scale = BigInt::from(10u32).pow(places);
    let scaled = round_half_up(&(q.abs() * Rational::from_integer(scale.clone())));
    let int_part = &scaled / &scale;
    let frac_part = &scaled % &scale;
    let sign = if negative && !scaled.is_zero() { "-" } else { "" };
    if places == 0 {
        return format!("{sign}{int_part}");
    }
    format!(
        "{sign}{int_part}.{frac:0>width$}",
        frac = frac_part.to_string(),
        width = places as usize
    )
}

/// Serde helpers storing a rational as an exact `"numer/denom"` string.
pub mod exact {
    use super::Rational;
    use num::BigInt;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(value: &Rational, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Rational, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let (numer, denom) = match raw.split_once('/') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (raw.trim(), "1"),
        };
        let numer = BigInt::from_str(numer).map_err(de::Error::custom)?;
        let denom = BigInt::from_str(denom).map_err(de::Error::custom)?;
        if denom == BigInt::from(0) {
            return Err(de::Error::custom("zero denominator"));
        }
        Ok(Rational::new(numer, denom))
    }
}
