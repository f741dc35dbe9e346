//! Exact decimal numeric type backed by rust_decimal.
//!
//! Quantities, prices, notionals and fees all flow through this type so that
//! weighted averages and closure comparisons never pick up binary
//! floating-point drift.

use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;
use thiserror::Error;

/// An arithmetic result outside the range rust_decimal can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("decimal overflow in {op}")]
pub struct DecimalOverflow {
    pub op: &'static str,
}

/// Exact decimal numeric type for quantities, prices and money.
///
/// Serializes to a JSON string so values survive round trips through
/// producers that encode numbers as text.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::str")] RustDecimal);

impl Decimal {
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a Decimal from its textual form.
    ///
    /// Leading and trailing whitespace is ignored; scientific notation is
    /// accepted as a fallback for producers that emit it.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        let trimmed = s.trim();
        RustDecimal::from_str(trimmed)
            .or_else(|_| RustDecimal::from_scientific(trimmed))
            .map(Decimal)
    }

    /// Format the Decimal as a canonical string (no exponent, no trailing zeros).
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    pub fn hundred() -> Self {
        Decimal(RustDecimal::ONE_HUNDRED)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    pub fn checked_add(self, rhs: Decimal) -> Result<Decimal, DecimalOverflow> {
        self.0
            .checked_add(rhs.0)
            .map(Decimal)
            .ok_or(DecimalOverflow { op: "add" })
    }

    pub fn checked_sub(self, rhs: Decimal) -> Result<Decimal, DecimalOverflow> {
        self.0
            .checked_sub(rhs.0)
            .map(Decimal)
            .ok_or(DecimalOverflow { op: "sub" })
    }

    pub fn checked_mul(self, rhs: Decimal) -> Result<Decimal, DecimalOverflow> {
        self.0
            .checked_mul(rhs.0)
            .map(Decimal)
            .ok_or(DecimalOverflow { op: "mul" })
    }

    /// Divide, yielding zero when the divisor is zero.
    ///
    /// Used for ratios (average exit price, P&L percentage) whose denominator
    /// can legitimately be empty.
    pub fn div_or_zero(self, divisor: Decimal) -> Result<Decimal, DecimalOverflow> {
        if divisor.is_zero() {
            return Ok(Decimal::zero());
        }
        self.0
            .checked_div(divisor.0)
            .map(Decimal)
            .ok_or(DecimalOverflow { op: "div" })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

// Arithmetic operations
impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Decimal {
        iter.fold(Decimal::zero(), |acc, d| acc + d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_decimal_canonical_strips_trailing_zeros() {
        assert_eq!(d("0.41099000").to_canonical_string(), "0.41099");
        assert_eq!(d("110.000").to_canonical_string(), "110");
        assert!(!d("123").to_canonical_string().contains('e'));
    }

    #[test]
    fn test_decimal_parse_trims_and_accepts_scientific() {
        assert_eq!(d("  12.5 "), d("12.5"));
        assert_eq!(d("1e2"), d("100"));
        assert!(Decimal::from_str_canonical("abc").is_err());
        assert!(Decimal::from_str_canonical("").is_err());
    }

    #[test]
    fn test_decimal_arithmetic_is_exact() {
        let a = d("0.1");
        let b = d("0.2");
        assert_eq!(a + b, d("0.3"));

        let total = d("3") + d("0.41099") + d("1.48842");
        assert_eq!(total, d("4.89941"));
        assert!((total - d("4.89941")).is_zero());
    }

    #[test]
    fn test_decimal_weighted_average() {
        let avg = (d("10") * d("100") + d("10") * d("120")) / (d("10") + d("10"));
        assert_eq!(avg, d("110"));
    }

    #[test]
    fn test_div_or_zero_guards_zero_divisor() {
        assert_eq!(d("100").div_or_zero(Decimal::zero()), Ok(Decimal::zero()));
        assert_eq!(d("100").div_or_zero(d("4")), Ok(d("25")));
    }

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        let max = Decimal::new(RustDecimal::MAX);
        assert_eq!(max.checked_mul(d("2")), Err(DecimalOverflow { op: "mul" }));
        assert_eq!(max.checked_add(d("1")), Err(DecimalOverflow { op: "add" }));
        assert_eq!((-max).checked_sub(d("1")), Err(DecimalOverflow { op: "sub" }));
        assert_eq!(max.div_or_zero(d("0.5")), Err(DecimalOverflow { op: "div" }));

        assert_eq!(d("2.5").checked_mul(d("4")), Ok(d("10")));
        assert_eq!(d("2.5").checked_add(d("0.5")), Ok(d("3")));
        assert_eq!(d("2.5").checked_sub(d("3")), Ok(d("-0.5")));
    }

    #[test]
    fn test_decimal_sum_and_add_assign() {
        let total: Decimal = vec![d("1.5"), d("2.5"), d("-1")].into_iter().sum();
        assert_eq!(total, d("3"));

        let mut acc = Decimal::zero();
        acc += d("0.25");
        acc += d("0.75");
        assert_eq!(acc, d("1"));
    }

    #[test]
    fn test_decimal_sign_helpers() {
        assert!(d("0.0001").is_positive());
        assert!(d("-0.0001").is_negative());
        assert!(!Decimal::zero().is_positive());
        assert!(!Decimal::zero().is_negative());
        assert_eq!(d("-5").abs(), d("5"));
    }

    #[test]
    fn test_decimal_json_serialization_is_string() {
        let json = serde_json::to_value(d("123.456")).unwrap();
        assert_eq!(json, serde_json::json!("123.456"));
        let back: Decimal = serde_json::from_value(json).unwrap();
        assert_eq!(back, d("123.456"));
    }
}
