//! Payment assets and exact base-unit conversion.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::ValidationError;

/// Decimals of the native coin.
pub const NATIVE_DECIMALS: u8 = 9;

/// Lamports per whole SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// What the buyer pays with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PaymentAsset {
    /// Native SOL, moved with a system transfer.
    #[default]
    Native,
    /// An SPL token, moved with `TransferChecked` between associated token
    /// accounts.
    Token {
        /// Token mint.
        mint: Address,
        /// Mint decimals.
        decimals: u8,
    },
}

impl PaymentAsset {
    /// Number of decimal places of the smallest indivisible unit.
    #[must_use]
    pub const fn decimals(&self) -> u8 {
        match self {
            Self::Native => NATIVE_DECIMALS,
            Self::Token { decimals, .. } => *decimals,
        }
    }

    /// Token mint, if any.
    #[must_use]
    pub const fn mint(&self) -> Option<&Address> {
        match self {
            Self::Native => None,
            Self::Token { mint, .. } => Some(mint),
        }
    }

    /// Converts a decimal amount into base units.
    ///
    /// The conversion is exact: an amount with more fractional digits than
    /// the asset supports is rejected rather than rounded.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::NegativeAmount`] for amounts below zero
    /// - [`ValidationError::InexactAmount`] if rounding would be required
    /// - [`ValidationError::AmountOverflow`] if the result exceeds `u64`
    pub fn to_base_units(&self, amount: Decimal) -> Result<u64, ValidationError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValidationError::NegativeAmount);
        }
        let decimals = self.decimals();
        let factor = 10u64
            .checked_pow(u32::from(decimals))
            .ok_or(ValidationError::AmountOverflow)?;
        let scaled = amount
            .checked_mul(Decimal::from(factor))
            .ok_or(ValidationError::AmountOverflow)?;
        if !scaled.fract().is_zero() {
            return Err(ValidationError::InexactAmount { amount, decimals });
        }
        scaled.to_u64().ok_or(ValidationError::AmountOverflow)
    }

    /// Converts base units back into a decimal amount.
    ///
    /// Returns `None` when the asset has more decimals than a [`Decimal`]
    /// can carry.
    #[must_use]
    pub fn from_base_units(&self, units: u64) -> Option<Decimal> {
        Decimal::try_from_i128_with_scale(i128::from(units), u32::from(self.decimals()))
            .ok()
            .map(|d| d.normalize())
    }
}
