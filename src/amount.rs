use ethers::types::{U256, U512};
use std::cmp::Ordering;

use crate::error::InputError;
use crate::tokens::Currency;

/// Wei kept back from a native balance for gas when computing the max spend.
pub const MIN_NATIVE_FOR_GAS: u64 = 10_000_000_000_000_000; // 0.01 ETH

/// An amount of a currency in base units. Stored as a fraction so that
/// percentage arithmetic stays exact until it is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyAmount {
    currency: Currency,
    numerator: U512,
    denominator: U512,
}

impl CurrencyAmount {
    pub fn from_raw(currency: Currency, raw: U256) -> Self {
        Self {
            currency,
            numerator: U512::from(raw),
            denominator: U512::one(),
        }
    }

    /// Parses display units (`"12.5"`) at the currency's precision.
    ///
    /// Accepts `digits`, `digits.`, `.digits` and `digits.digits`. Signs,
    /// exponents, separators and more fractional digits than the currency
    /// supports are rejected.
    pub fn parse(text: &str, currency: Currency) -> Result<Self, InputError> {
        let decimals = currency.decimals() as usize;
        let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));

        if whole.is_empty() && fraction.is_empty() {
            return Err(InputError::InvalidInput);
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(InputError::InvalidInput);
        }
        if fraction.len() > decimals {
            return Err(InputError::InvalidInput);
        }

        let mut digits = String::with_capacity(whole.len() + decimals);
        digits.push_str(whole);
        digits.push_str(fraction);
        digits.extend(std::iter::repeat('0').take(decimals - fraction.len()));
        let digits = digits.trim_start_matches('0');

        let raw = if digits.is_empty() {
            U256::zero()
        } else {
            U256::from_dec_str(digits).map_err(|_| InputError::InvalidInput)?
        };
        Ok(Self::from_raw(currency, raw))
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Base units, rounded down.
    pub fn raw(&self) -> U256 {
        U256::try_from(self.numerator / self.denominator).unwrap_or(U256::MAX)
    }

    pub fn is_zero(&self) -> bool {
        self.raw().is_zero()
    }

    pub fn multiply(&self, by: u64) -> Self {
        Self {
            currency: self.currency.clone(),
            numerator: self.numerator.saturating_mul(U512::from(by)),
            denominator: self.denominator,
        }
    }

    /// `None` when dividing by zero.
    pub fn divide(&self, by: u64) -> Option<Self> {
        if by == 0 {
            return None;
        }
        Some(Self {
            currency: self.currency.clone(),
            numerator: self.numerator,
            denominator: self.denominator.saturating_mul(U512::from(by)),
        })
    }

    /// Renders the rounded-down amount in display units with trailing zeros
    /// trimmed, e.g. `"1.5"`, `"75"`, `"0.000001"`.
    pub fn to_exact(&self) -> String {
        let decimals = self.currency.decimals() as usize;
        let raw = self.raw().to_string();
        if decimals == 0 {
            return raw;
        }

        let padded = format!("{:0>width$}", raw, width = decimals + 1);
        let (whole, fraction) = padded.split_at(padded.len() - decimals);
        let fraction = fraction.trim_end_matches('0');
        if fraction.is_empty() {
            whole.to_string()
        } else {
            format!("{whole}.{fraction}")
        }
    }

    pub fn cmp_raw(&self, other: &Self) -> Ordering {
        self.raw().cmp(&other.raw())
    }

    pub fn less_than(&self, other: &Self) -> bool {
        self.cmp_raw(other) == Ordering::Less
    }
}

/// The largest amount the user can put into a position. Native balances
/// keep a small reserve for gas.
pub fn max_amount_spend(balance: Option<&CurrencyAmount>) -> Option<CurrencyAmount> {
    let balance = balance?;
    if !balance.currency().is_native() {
        return Some(balance.clone());
    }
    let reserve = U256::from(MIN_NATIVE_FOR_GAS);
    let raw = balance.raw();
    let spendable = if raw > reserve { raw - reserve } else { U256::zero() };
    Some(CurrencyAmount::from_raw(balance.currency().clone(), spendable))
}
