use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::Error;

/// Fixed-point amount held as integer minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const DECIMALS: u32 = 2;
    pub const SCALE: i64 = 100;
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Whole currency units, e.g. `Money::from_major(500)` is 500.00.
    pub const fn from_major(major: i64) -> Self {
        Self(major * Self::SCALE)
    }

    pub fn as_minor(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Rounds half-to-even onto two decimals. `None` when the value does not fit.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        let rounded = value.round_dp_with_strategy(Self::DECIMALS, RoundingStrategy::MidpointNearestEven);
        let widen = 10i128.checked_pow(Self::DECIMALS - rounded.scale())?;
        let minor = rounded.mantissa().checked_mul(widen)?;
        i64::try_from(minor).ok().map(Self)
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, Self::DECIMALS)
    }
}

impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let value = Decimal::from_str(s)
            .map_err(|e| Error::InvalidAmount(format!("{s:?} is not a decimal amount: {e}")))?;
        Money::from_decimal(value).ok_or_else(|| Error::InvalidAmount(format!("{s} is out of range")))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Money::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::Money;
    use std::str::FromStr;

    #[test]
    fn bankers_round_half_even() {
        assert_eq!(Money::from_str("1.245").unwrap().to_string(), "1.24");
        assert_eq!(Money::from_str("1.255").unwrap().to_string(), "1.26");
        assert_eq!(Money::from_str("-1.245").unwrap().to_string(), "-1.24");
        assert_eq!(Money::from_str("-1.255").unwrap().to_string(), "-1.26");
    }

    #[test]
    fn short_scales_are_widened_to_cents() {
        assert_eq!(Money::from_str("1500").unwrap(), Money::from_minor(150_000));
        assert_eq!(Money::from_str("0.5").unwrap(), Money::from_minor(50));
        assert_eq!(Money::from_major(1500).to_string(), "1500.00");
    }

    #[test]
    fn garbage_and_overflow_are_invalid_amounts() {
        assert!(Money::from_str("ten").is_err());
        assert!(Money::from_str("").is_err());
        assert!(Money::from_str("99999999999999999999").is_err());
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        assert_eq!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)), None);
        assert_eq!(
            Money::from_major(10).checked_sub(Money::from_major(3)),
            Some(Money::from_major(7))
        );
    }
}
