//! Server-side transaction builder.
//!
//! Builds the unsigned transfer a buyer is asked to sign: one transfer
//! instruction, the buyer as fee payer, a `finalized` blockhash as validity
//! anchor, and the reference appended as a read-only, non-signer account.
//! The builder reads the ledger once for the anchor and has no other side
//! effects.

use rust_decimal::Decimal;
use solana_instruction::{AccountMeta, Instruction};
use solana_message::{Hash, Message, VersionedMessage};
use solana_pubkey::Pubkey;

use crate::address::Address;
use crate::asset::PaymentAsset;
use crate::error::{CheckoutError, ValidationError};
use crate::intent::PaymentIntent;
use crate::ledger::LedgerClient;
use crate::reference::Reference;
use crate::transaction::{EncodingError, UnsignedTransaction, associated_token_address};

/// Builds a system program transfer of `lamports` from `from` to `to`.
#[must_use]
pub fn native_transfer_instruction(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    solana_system_interface::instruction::transfer(from, to, lamports)
}

/// Builds an SPL `TransferChecked` between the associated token accounts of
/// `owner` and `recipient`.
///
/// # Errors
///
/// Returns [`EncodingError::Instruction`] if the token program rejects the
/// arguments.
pub fn token_transfer_instruction(
    owner: &Pubkey,
    recipient: &Pubkey,
    mint: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Result<Instruction, EncodingError> {
    let source = associated_token_address(owner, mint);
    let destination = associated_token_address(recipient, mint);
    spl_token::instruction::transfer_checked(
        &spl_token::ID,
        &source,
        mint,
        &destination,
        owner,
        &[],
        amount,
        decimals,
    )
    .map_err(|e| EncodingError::Instruction(format!("{e}")))
}

/// Appends `reference` as a read-only, non-signer account.
#[must_use]
pub fn with_reference(mut instruction: Instruction, reference: &Reference) -> Instruction {
    instruction
        .accounts
        .push(AccountMeta::new_readonly(*reference.pubkey(), false));
    instruction
}

/// Compiles a single instruction into a legacy message paid by `payer`.
#[must_use]
pub fn compile(payer: &Pubkey, instruction: &Instruction, blockhash: &Hash) -> UnsignedTransaction {
    let message = Message::new_with_blockhash(
        std::slice::from_ref(instruction),
        Some(payer),
        blockhash,
    );
    UnsignedTransaction::from_message(VersionedMessage::Legacy(message))
}

/// Input of [`TransactionBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Buyer wallet; pays the amount and the fee.
    pub buyer: Option<Address>,
    /// Amount in whole coins.
    pub amount: Decimal,
    /// Reference generated by the caller for this attempt.
    pub reference: Option<Reference>,
}

/// Output of [`TransactionBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    /// Terms of the attempt.
    pub intent: PaymentIntent,
    /// Transaction for the buyer to sign.
    pub transaction: UnsignedTransaction,
}

/// Builds reference-tagged transfers to one merchant wallet.
#[derive(Debug, Clone)]
pub struct TransactionBuilder<L> {
    ledger: L,
    recipient: Address,
    asset: PaymentAsset,
}

impl<L> TransactionBuilder<L> {
    /// Creates a builder paying `recipient` in `asset`.
    pub const fn new(ledger: L, recipient: Address, asset: PaymentAsset) -> Self {
        Self {
            ledger,
            recipient,
            asset,
        }
    }

    /// Merchant wallet.
    pub const fn recipient(&self) -> &Address {
        &self.recipient
    }

    /// Asset paid.
    pub const fn asset(&self) -> &PaymentAsset {
        &self.asset
    }

    /// Ledger handle.
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }
}

impl<L: LedgerClient> TransactionBuilder<L> {
    /// Builds an unsigned transaction for `request`.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::ZeroAmount`], [`ValidationError::MissingReference`]
    ///   or [`ValidationError::MissingAccount`] on malformed input, checked in
    ///   that order
    /// - [`ValidationError::InexactAmount`] or [`ValidationError::AmountOverflow`]
    ///   if the amount has no exact base-unit representation
    /// - [`crate::ledger::LedgerError::Unavailable`] if the anchor cannot be
    ///   fetched
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(skip_all, err, fields(amount = %request.amount))
    )]
    pub async fn build(&self, request: TransferRequest) -> Result<BuiltTransaction, CheckoutError> {
        if request.amount.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        let reference = request.reference.ok_or(ValidationError::MissingReference)?;
        let buyer = request.buyer.ok_or(ValidationError::MissingAccount)?;
        let base_units = self.asset.to_base_units(request.amount)?;

        let anchor = self.ledger.latest_anchor().await?;

        let transfer = match &self.asset {
            PaymentAsset::Native => {
                native_transfer_instruction(buyer.pubkey(), self.recipient.pubkey(), base_units)
            }
            PaymentAsset::Token { mint, decimals } => token_transfer_instruction(
                buyer.pubkey(),
                self.recipient.pubkey(),
                mint.pubkey(),
                base_units,
                *decimals,
            )?,
        };
        let instruction = with_reference(transfer, &reference);
        let transaction = compile(buyer.pubkey(), &instruction, &anchor.blockhash);

        #[cfg(feature = "telemetry")]
        tracing::debug!(%reference, %buyer, base_units, "Built payment transaction");

        Ok(BuiltTransaction {
            intent: PaymentIntent {
                amount: request.amount,
                base_units,
                asset: self.asset,
                recipient: self.recipient,
                reference,
                fee_payer: buyer,
                anchor,
            },
            transaction,
        })
    }
}
