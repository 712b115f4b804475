use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// The largest number of decimal places an escrow asset may declare. 10^18 still fits in an i64.
pub const MAX_ASSET_DECIMALS: u32 = 18;

//--------------------------------------     AssetAmount       ---------------------------------------------------------
/// An amount of the escrow asset, expressed in the asset's smallest indivisible unit.
///
/// All comparisons between trade terms and on-ledger transfers are made on this integer representation. Decimal
/// amounts only exist at the edges of the system and are converted with [`AssetSpec::parse_decimal`].
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct AssetAmount(i64);

op!(binary AssetAmount, Add, add);
op!(binary AssetAmount, Sub, sub);
op!(inplace AssetAmount, SubAssign, sub_assign);

impl Sum for AssetAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for AssetAmount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for AssetAmount {
    type Error = AmountConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| AmountConversionError::Overflow(format!("{value} is too large to represent as an amount")))
    }
}

impl Display for AssetAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} units", self.0)
    }
}

impl AssetAmount {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountConversionError {
    #[error("Not a valid decimal amount: {0}")]
    InvalidFormat(String),
    #[error("Amount has more decimal places than the asset supports ({0})")]
    TooPrecise(u32),
    #[error("Amount is out of range. {0}")]
    Overflow(String),
    #[error("Negative amounts are not allowed")]
    Negative,
}

//--------------------------------------      AssetSpec       ---------------------------------------------------------
/// Describes the escrow asset: its ticker code and the fixed number of decimal places used to convert between the
/// human-facing decimal amount and [`AssetAmount`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub code: String,
    pub decimals: u32,
}

impl Default for AssetSpec {
    fn default() -> Self {
        Self { code: "USDC".to_string(), decimals: 6 }
    }
}

impl AssetSpec {
    pub fn new<S: Into<String>>(code: S, decimals: u32) -> Self {
        Self { code: code.into(), decimals: decimals.min(MAX_ASSET_DECIMALS) }
    }

    fn scale(&self) -> i64 {
        10i64.pow(self.decimals)
    }

    /// Converts a decimal string (e.g. `"2.5"`) into integer units without going through floating point.
    ///
    /// Leading `+` signs and surrounding whitespace are accepted. More fractional digits than `decimals` is an error,
    /// unless the extra digits are all zero.
    pub fn parse_decimal(&self, value: &str) -> Result<AssetAmount, AmountConversionError> {
        let s = value.trim();
        let s = s.strip_prefix('+').unwrap_or(s);
        if s.starts_with('-') {
            return Err(AmountConversionError::Negative);
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountConversionError::InvalidFormat(value.to_string()));
        }
        let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(AmountConversionError::InvalidFormat(value.to_string()));
        }
        let frac = frac.trim_end_matches('0');
        if frac.len() > self.decimals as usize {
            return Err(AmountConversionError::TooPrecise(self.decimals));
        }
        let overflow = || AmountConversionError::Overflow(value.to_string());
        let whole = if whole.is_empty() { 0 } else { i64::from_str(whole).map_err(|_| overflow())? };
        let frac_units = if frac.is_empty() {
            0
        } else {
            let padding = 10i64.pow(self.decimals - frac.len() as u32);
            i64::from_str(frac).map_err(|_| overflow())? * padding
        };
        let units = whole.checked_mul(self.scale()).and_then(|w| w.checked_add(frac_units)).ok_or_else(overflow)?;
        Ok(AssetAmount(units))
    }

    /// Renders integer units as a decimal string, trimming trailing zeros (`2500000` → `"2.5"` with 6 decimals).
    pub fn format_decimal(&self, amount: AssetAmount) -> String {
        let scale = self.scale();
        let sign = if amount.0 < 0 { "-" } else { "" };
        let abs = amount.0.unsigned_abs();
        let whole = abs / scale as u64;
        let frac = abs % scale as u64;
        if frac == 0 {
            return format!("{sign}{whole}");
        }
        let frac = format!("{frac:0width$}", width = self.decimals as usize);
        format!("{sign}{whole}.{}", frac.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_whole_and_fractional_amounts() {
        let spec = AssetSpec::new("USDC", 6);
        assert_eq!(spec.parse_decimal("2.5").unwrap(), AssetAmount::from(2_500_000));
        assert_eq!(spec.parse_decimal("3").unwrap(), AssetAmount::from(3_000_000));
        assert_eq!(spec.parse_decimal(".25").unwrap(), AssetAmount::from(250_000));
        assert_eq!(spec.parse_decimal(" +0.000001 ").unwrap(), AssetAmount::from(1));
        assert_eq!(spec.parse_decimal("1.500000000").unwrap(), AssetAmount::from(1_500_000));
    }

    #[test]
    fn parse_rejects_bad_input() {
        let spec = AssetSpec::new("USDC", 6);
        assert_eq!(spec.parse_decimal("-1"), Err(AmountConversionError::Negative));
        assert_eq!(spec.parse_decimal("0.0000001"), Err(AmountConversionError::TooPrecise(6)));
        assert!(matches!(spec.parse_decimal("1e5"), Err(AmountConversionError::InvalidFormat(_))));
        assert!(matches!(spec.parse_decimal("."), Err(AmountConversionError::InvalidFormat(_))));
        assert!(matches!(spec.parse_decimal(""), Err(AmountConversionError::InvalidFormat(_))));
        assert!(matches!(spec.parse_decimal("99999999999999999999"), Err(AmountConversionError::Overflow(_))));
    }

    #[test]
    fn zero_decimal_assets() {
        let spec = AssetSpec::new("SATS", 0);
        assert_eq!(spec.parse_decimal("42").unwrap(), AssetAmount::from(42));
        assert_eq!(spec.parse_decimal("42.0").unwrap(), AssetAmount::from(42));
        assert_eq!(spec.parse_decimal("42.1"), Err(AmountConversionError::TooPrecise(0)));
        assert_eq!(spec.format_decimal(AssetAmount::from(42)), "42");
    }

    #[test]
    fn format_trims_trailing_zeros() {
        let spec = AssetSpec::new("USDC", 6);
        assert_eq!(spec.format_decimal(AssetAmount::from(2_500_000)), "2.5");
        assert_eq!(spec.format_decimal(AssetAmount::from(1)), "0.000001");
        assert_eq!(spec.format_decimal(AssetAmount::from(7_000_000)), "7");
        assert_eq!(spec.format_decimal(AssetAmount::from(-1_250_000)), "-1.25");
    }

    #[test]
    fn amounts_compare_as_integers() {
        let spec = AssetSpec::new("USDC", 6);
        let price = spec.parse_decimal("2.5").unwrap();
        let paid = spec.parse_decimal("2.499999").unwrap();
        assert!(paid < price);
        assert_eq!(price - paid, AssetAmount::from(1));
        let total: AssetAmount = vec![paid, AssetAmount::from(1)].into_iter().sum();
        assert_eq!(total, price);
    }
}
