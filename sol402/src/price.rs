//! Human price to atomic token amount conversion.
//!
//! Route configurations price resources either in USD money (`"$0.01"`,
//! `0.01`) or as an explicit atomic amount with an asset descriptor. Money
//! is resolved against a default token (caller-supplied, else the
//! compiled-in USDC deployment for the network) and converted with pure
//! decimal-string arithmetic; floats never enter the computation.

use serde::{Deserialize, Serialize};

use crate::network::{Network, usdc_deployment};

/// Minimum accepted money value, in dollars.
const MIN_MONEY: &str = "0.0001";

/// Describes the token an amount is denominated in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDescriptor {
    /// Base58 mint address.
    pub address: String,
    /// Number of decimal places in the token's atomic unit.
    pub decimals: u8,
    /// Human-readable token name.
    pub name: String,
}

impl AssetDescriptor {
    /// Descriptor for a compiled-in deployment.
    #[must_use]
    pub fn from_deployment(deployment: &crate::network::TokenDeployment) -> Self {
        Self {
            address: deployment.mint.to_owned(),
            decimals: deployment.decimals,
            name: deployment.name.to_owned(),
        }
    }
}

/// A price as written in a route configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    /// USD money: `"$0.01"`, `"0.01"`, or the bare number `0.01`.
    Money(MoneyValue),
    /// An explicit atomic amount in a specific token.
    TokenAmount {
        /// Decimal integer string in the token's atomic units.
        amount: String,
        /// The token the amount is denominated in.
        asset: AssetDescriptor,
    },
}

/// A money value as it appears in JSON: a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MoneyValue {
    /// String form, with optional leading `$`.
    Text(String),
    /// Bare JSON number.
    Number(serde_json::Number),
}

impl MoneyValue {
    fn as_decimal_str(&self) -> String {
        match self {
            Self::Text(s) => s.trim().trim_start_matches('$').trim().to_owned(),
            Self::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for Price {
    fn from(s: &str) -> Self {
        Self::Money(MoneyValue::Text(s.to_owned()))
    }
}

/// Errors converting a price to an atomic amount.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PriceError {
    /// The money value is not a plain decimal number.
    #[error("invalid money value: {0}")]
    InvalidMoney(String),
    /// The money value is below the 0.0001 minimum.
    #[error("money value below minimum of ${MIN_MONEY}")]
    BelowMinimum,
    /// No default token is known for the network.
    #[error("no default token for network {0}")]
    NoDefaultToken(Network),
    /// The explicit amount is not a decimal integer string.
    #[error("invalid atomic amount: {0}")]
    InvalidAmount(String),
    /// The atomic amount overflows `u64`.
    #[error("atomic amount overflows u64")]
    Overflow,
}

/// Converts a [`Price`] to `(atomic_amount, asset)` for a network.
///
/// For money prices, the asset is `default_token` when supplied, else the
/// compiled-in USDC deployment keyed by the network's chain id. Atomic
/// value is `round(dollars * 10^decimals)` with ties rounded away from
/// zero.
///
/// # Errors
///
/// Returns [`PriceError`] on non-numeric money, values below `$0.0001`,
/// unknown default assets, or `u64` overflow.
pub fn price_to_atomic(
    price: &Price,
    network: Network,
    default_token: Option<&AssetDescriptor>,
) -> Result<(u64, AssetDescriptor), PriceError> {
    match price {
        Price::Money(value) => {
            let decimal = value.as_decimal_str();
            let (whole, frac) = split_decimal(&decimal)?;
            if below_minimum(whole, frac) {
                return Err(PriceError::BelowMinimum);
            }
            let asset = match default_token {
                Some(token) => token.clone(),
                None => usdc_deployment(network)
                    .map(AssetDescriptor::from_deployment)
                    .ok_or(PriceError::NoDefaultToken(network))?,
            };
            let atomic = shift_and_round(whole, frac, asset.decimals)?;
            Ok((atomic, asset))
        }
        Price::TokenAmount { amount, asset } => {
            if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
                return Err(PriceError::InvalidAmount(amount.clone()));
            }
            let atomic = amount.parse().map_err(|_| PriceError::Overflow)?;
            Ok((atomic, asset.clone()))
        }
    }
}

/// Splits a decimal string into whole and fractional digit runs.
fn split_decimal(s: &str) -> Result<(&str, &str), PriceError> {
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    let valid = !((whole.is_empty() && frac.is_empty())
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit()));
    if valid {
        Ok((whole, frac))
    } else {
        Err(PriceError::InvalidMoney(s.to_owned()))
    }
}

/// True when `whole.frac < 0.0001`.
fn below_minimum(whole: &str, frac: &str) -> bool {
    if whole.bytes().any(|b| b != b'0') {
        return false;
    }
    let min_frac = MIN_MONEY.split_once('.').map_or("", |(_, f)| f);
    let mut padded = frac.as_bytes().iter().copied().chain(std::iter::repeat(b'0'));
    for min_digit in min_frac.bytes() {
        let digit = padded.next().unwrap_or(b'0');
        if digit < min_digit {
            return true;
        }
        if digit > min_digit {
            return false;
        }
    }
    // Matched the minimum digit for digit; equality is allowed.
    false
}

/// Shifts `whole.frac` left by `decimals` digits, rounding half away from
/// zero on the remainder.
fn shift_and_round(whole: &str, frac: &str, decimals: u8) -> Result<u64, PriceError> {
    let decimals = usize::from(decimals);
    let mut digits = String::with_capacity(whole.len() + decimals);
    digits.push_str(whole);
    if frac.len() <= decimals {
        digits.push_str(frac);
        for _ in 0..decimals - frac.len() {
            digits.push('0');
        }
    } else {
        digits.push_str(&frac[..decimals]);
    }

    let mut atomic: u64 = if digits.is_empty() {
        0
    } else {
        let trimmed = digits.trim_start_matches('0');
        if trimmed.is_empty() {
            0
        } else {
            trimmed.parse().map_err(|_| PriceError::Overflow)?
        }
    };

    if frac.len() > decimals {
        let first_dropped = frac.as_bytes()[decimals];
        if first_dropped >= b'5' {
            atomic = atomic.checked_add(1).ok_or(PriceError::Overflow)?;
        }
    }

    Ok(atomic)
}
