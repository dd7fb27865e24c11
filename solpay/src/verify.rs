//! Settled transfer verification.
//!
//! A reference alone only proves that *some* transaction mentioned it. Before
//! a checkout is reported as paid, the settled transaction is checked against
//! the terms the buyer signed: the instruction carrying the reference must be
//! a transfer of exactly the expected amount to the expected account.

use serde::{Deserialize, Serialize};
use solana_transaction::versioned::VersionedTransaction;

use crate::address::Address;
use crate::reference::Reference;
use crate::transaction::{ParsedTransfer, UnsignedTransaction, instruction_mentioning};

/// Terms a settled transaction must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedTransfer {
    /// Credited account: recipient wallet (native) or its token account.
    pub destination: Address,
    /// Token mint, `None` for native SOL.
    pub mint: Option<Address>,
    /// Exact amount in base units.
    pub base_units: u64,
    /// Reference the transfer instruction must carry.
    pub reference: Reference,
}

impl ExpectedTransfer {
    /// Reads the terms back from an unsigned transaction.
    ///
    /// Returns `None` unless the transaction holds a single transfer carrying
    /// `reference`.
    #[must_use]
    pub fn from_transaction(
        transaction: &UnsignedTransaction,
        reference: Reference,
    ) -> Option<Self> {
        let transfer = transaction.transfer()?;
        if !transfer.extra_accounts.contains(reference.pubkey()) {
            return None;
        }
        Some(Self {
            destination: transfer.destination.into(),
            mint: transfer.mint.map(Address::from),
            base_units: transfer.amount,
            reference,
        })
    }
}

/// Settled transaction does not match the expected transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// No instruction lists the reference.
    #[error("Reference not found in transaction")]
    ReferenceNotFound,
    /// The instruction carrying the reference is not a transfer.
    #[error("Instruction carrying the reference is not a transfer")]
    NotATransfer,
    /// Funds went elsewhere.
    #[error("Recipient mismatch: expected {expected}, found {found}")]
    RecipientMismatch {
        /// Expected credited account.
        expected: Address,
        /// Account actually credited.
        found: Address,
    },
    /// A different asset was moved.
    #[error("Asset mismatch")]
    AssetMismatch,
    /// A different amount was moved.
    #[error("Amount mismatch: expected {expected}, found {found}")]
    AmountMismatch {
        /// Expected base units.
        expected: u64,
        /// Base units actually moved.
        found: u64,
    },
}

/// Checks a settled transaction against the expected transfer.
///
/// # Errors
///
/// Returns the first [`VerificationError`] encountered.
pub fn verify_transfer(
    transaction: &VersionedTransaction,
    expected: &ExpectedTransfer,
) -> Result<ParsedTransfer, VerificationError> {
    let message = &transaction.message;
    let index = instruction_mentioning(message, expected.reference.pubkey())
        .ok_or(VerificationError::ReferenceNotFound)?;
    let transfer =
        ParsedTransfer::from_message(message, index).ok_or(VerificationError::NotATransfer)?;

    if transfer.mint.map(Address::from) != expected.mint {
        return Err(VerificationError::AssetMismatch);
    }
    let found = Address::from(transfer.destination);
    if found != expected.destination {
        return Err(VerificationError::RecipientMismatch {
            expected: expected.destination,
            found,
        });
    }
    if transfer.amount != expected.base_units {
        return Err(VerificationError::AmountMismatch {
            expected: expected.base_units,
            found: transfer.amount,
        });
    }
    Ok(transfer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::PaymentAsset;
    use crate::testing::{intent, native_transfer, token_transfer};
    use solana_keypair::Keypair;
    use solana_signer::Signer;

    #[test]
    fn test_matching_native_transfer() {
        let intent = intent(PaymentAsset::Native, 100_000_000);
        let tx = native_transfer(
            *intent.fee_payer.pubkey(),
            *intent.recipient.pubkey(),
            100_000_000,
            intent.reference,
        );
        let parsed = verify_transfer(tx.inner(), &intent.expected_transfer()).unwrap();
        assert_eq!(parsed.amount, 100_000_000);
    }

    #[test]
    fn test_wrong_amount() {
        let intent = intent(PaymentAsset::Native, 100);
        let tx = native_transfer(
            *intent.fee_payer.pubkey(),
            *intent.recipient.pubkey(),
            99,
            intent.reference,
        );
        assert_eq!(
            verify_transfer(tx.inner(), &intent.expected_transfer()),
            Err(VerificationError::AmountMismatch {
                expected: 100,
                found: 99
            })
        );
    }

    #[test]
    fn test_wrong_recipient() {
        let intent = intent(PaymentAsset::Native, 100);
        let thief = Keypair::new().pubkey();
        let tx = native_transfer(*intent.fee_payer.pubkey(), thief, 100, intent.reference);
        assert!(matches!(
            verify_transfer(tx.inner(), &intent.expected_transfer()),
            Err(VerificationError::RecipientMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_reference() {
        let intent = intent(PaymentAsset::Native, 100);
        let tx = native_transfer(
            *intent.fee_payer.pubkey(),
            *intent.recipient.pubkey(),
            100,
            Reference::generate(),
        );
        assert_eq!(
            verify_transfer(tx.inner(), &intent.expected_transfer()),
            Err(VerificationError::ReferenceNotFound)
        );
    }

    #[test]
    fn test_token_transfer_checks_mint() {
        let mint = Keypair::new().pubkey();
        let intent = intent(
            PaymentAsset::Token {
                mint: mint.into(),
                decimals: 6,
            },
            5_000,
        );
        let good = token_transfer(
            *intent.fee_payer.pubkey(),
            *intent.recipient.pubkey(),
            mint,
            6,
            5_000,
            intent.reference,
        );
        assert!(verify_transfer(good.inner(), &intent.expected_transfer()).is_ok());

        let other_mint = Keypair::new().pubkey();
        let bad = token_transfer(
            *intent.fee_payer.pubkey(),
            *intent.recipient.pubkey(),
            other_mint,
            6,
            5_000,
            intent.reference,
        );
        assert_eq!(
            verify_transfer(bad.inner(), &intent.expected_transfer()),
            Err(VerificationError::AssetMismatch)
        );
    }

    #[test]
    fn test_expected_from_transaction() {
        let intent = intent(PaymentAsset::Native, 7);
        let tx = native_transfer(
            *intent.fee_payer.pubkey(),
            *intent.recipient.pubkey(),
            7,
            intent.reference,
        );
        assert_eq!(
            ExpectedTransfer::from_transaction(&tx, intent.reference),
            Some(intent.expected_transfer())
        );
        assert_eq!(
            ExpectedTransfer::from_transaction(&tx, Reference::generate()),
            None
        );
    }
}
