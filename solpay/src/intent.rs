//! Payment intents and validity anchors.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use solana_message::Hash;

use crate::address::Address;
use crate::asset::PaymentAsset;
use crate::reference::Reference;
use crate::transaction::associated_token_address;
use crate::verify::ExpectedTransfer;

/// A recent ledger marker bounding how long a transaction stays valid.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityAnchor {
    /// Recent blockhash embedded in the message.
    #[serde_as(as = "DisplayFromStr")]
    pub blockhash: Hash,
    /// Last block height at which the blockhash is accepted.
    pub last_valid_block_height: u64,
}

/// The terms of one checkout attempt.
///
/// Immutable once the transaction carrying it has been serialized. A rebuild
/// produces a new intent with a new reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    /// Amount in whole coins.
    pub amount: Decimal,
    /// Amount in the asset's smallest unit.
    pub base_units: u64,
    /// What is being paid.
    pub asset: PaymentAsset,
    /// Merchant wallet.
    pub recipient: Address,
    /// Lookup tag carried by the transfer instruction.
    pub reference: Reference,
    /// Buyer wallet, which also pays the fee.
    pub fee_payer: Address,
    /// Anchor the transaction was built against.
    pub anchor: ValidityAnchor,
}

impl PaymentIntent {
    /// Returns `true` if both intents move the same money between the same
    /// parties. The anchor is ignored.
    #[must_use]
    pub fn same_terms(&self, other: &Self) -> bool {
        self.base_units == other.base_units
            && self.asset == other.asset
            && self.recipient == other.recipient
            && self.fee_payer == other.fee_payer
    }

    /// What a settled transaction for this intent must contain.
    #[must_use]
    pub fn expected_transfer(&self) -> ExpectedTransfer {
        ExpectedTransfer {
            destination: self.credited_account(),
            mint: self.asset.mint().copied(),
            base_units: self.base_units,
            reference: self.reference,
        }
    }

    /// Account credited by the transfer: the recipient wallet for native
    /// payments, its associated token account for token payments.
    #[must_use]
    pub fn credited_account(&self) -> Address {
        match &self.asset {
            PaymentAsset::Native => self.recipient,
            PaymentAsset::Token { mint, .. } => {
                associated_token_address(self.recipient.pubkey(), mint.pubkey()).into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{anchor, intent};
    use solana_keypair::Keypair;
    use solana_signer::Signer;

    #[test]
    fn test_same_terms_ignores_anchor_and_reference() {
        let a = intent(PaymentAsset::Native, 100);
        let mut b = a.clone();
        b.anchor = anchor(7);
        b.reference = Reference::generate();
        assert!(a.same_terms(&b));

        let mut c = a.clone();
        c.base_units = 101;
        assert!(!a.same_terms(&c));

        let mut d = a.clone();
        d.recipient = Keypair::new().pubkey().into();
        assert!(!a.same_terms(&d));
    }

    #[test]
    fn test_token_intent_credits_associated_account() {
        let mint = Keypair::new().pubkey();
        let token = intent(
            PaymentAsset::Token {
                mint: mint.into(),
                decimals: 6,
            },
            1_000,
        );
        let expected = token.expected_transfer();
        assert_eq!(
            expected.destination.pubkey(),
            &associated_token_address(token.recipient.pubkey(), &mint)
        );
        assert_eq!(expected.mint, Some(mint.into()));

        let native = intent(PaymentAsset::Native, 1_000);
        assert_eq!(native.expected_transfer().destination, native.recipient);
    }

    #[test]
    fn test_anchor_serializes_blockhash_as_string() {
        let anchor = anchor(3);
        let json = serde_json::to_value(anchor).unwrap();
        assert_eq!(json["blockhash"], anchor.blockhash.to_string());
        assert_eq!(json["lastValidBlockHeight"], 3);
    }
}
