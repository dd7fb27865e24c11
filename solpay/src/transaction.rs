//! Unsigned transaction wrapper and its transport codec.
//!
//! The wire format is the ledger's own bincode serialization, wrapped in
//! base64 so it can travel inside JSON. Signature slots are present but zeroed
//! until the wallet fills them in place. Encoding and decoding never touch
//! amounts or key order: the bytes a buyer signs are the bytes the server
//! built.

use serde::{Deserialize, Serialize};
use solana_message::compiled_instruction::CompiledInstruction;
use solana_message::{Hash, VersionedMessage};
use solana_pubkey::{Pubkey, pubkey};
use solana_signature::Signature;
use solana_signer::Signer;
use solana_system_interface::instruction::SystemInstruction;
use solana_transaction::versioned::VersionedTransaction;
use std::fmt;

use crate::encoding::Base64Bytes;
use crate::reference::Reference;

/// Associated Token Account program.
pub const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Derives the associated token account of `wallet` for `mint`.
#[must_use]
pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
    let (ata, _) = Pubkey::find_program_address(
        &[wallet.as_ref(), spl_token::ID.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_PUBKEY,
    );
    ata
}

/// Failure to move a transaction across the text boundary.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    /// An instruction could not be constructed.
    #[error("Can not build instruction: {0}")]
    Instruction(String),
    /// Bincode serialization failed.
    #[error("Can not encode transaction: {0}")]
    Serialize(String),
    /// The text is not valid base64.
    #[error("Can not decode transaction: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The bytes are not a transaction.
    #[error("Can not decode transaction: {0}")]
    Deserialize(String),
    /// Bytes remained after the transaction.
    #[error("Can not decode transaction: {0} trailing bytes")]
    TrailingBytes(u64),
    /// The signature vector disagrees with the message header.
    #[error("Signature count mismatch: header requires {expected}, found {found}")]
    SignatureCount {
        /// Required signers per the header.
        expected: usize,
        /// Signature slots present.
        found: usize,
    },
}

/// Error signing a transaction.
#[derive(Debug, thiserror::Error)]
#[error("Can not sign transaction: {0}")]
pub struct TransactionSignError(pub String);

/// Signer and writable flags of an account in a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountFlags {
    /// Account must sign.
    pub is_signer: bool,
    /// Account may be written.
    pub is_writable: bool,
}

/// A transfer instruction decoded from a compiled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransfer {
    /// Program that executes the transfer.
    pub program_id: Pubkey,
    /// Debited account (wallet for native, token account for SPL).
    pub source: Pubkey,
    /// Credited account.
    pub destination: Pubkey,
    /// Account authorising the debit.
    pub authority: Pubkey,
    /// Amount in base units.
    pub amount: u64,
    /// Token mint, `None` for native transfers.
    pub mint: Option<Pubkey>,
    /// Decimals asserted by `TransferChecked`.
    pub decimals: Option<u8>,
    /// Trailing accounts that take no part in the transfer.
    pub extra_accounts: Vec<Pubkey>,
}

impl ParsedTransfer {
    /// Decodes the instruction at `index` of `message` as a system transfer or
    /// an SPL `TransferChecked`.
    #[must_use]
    pub fn from_message(message: &VersionedMessage, index: usize) -> Option<Self> {
        let instruction = message.instructions().get(index)?;
        let keys = message.static_account_keys();
        let accounts = resolve_accounts(instruction, keys)?;
        let program_id = *keys.get(usize::from(instruction.program_id_index))?;
        if program_id == solana_system_interface::program::ID {
            Self::system_transfer(program_id, &instruction.data, &accounts)
        } else if program_id == spl_token::ID {
            Self::token_transfer(program_id, &instruction.data, &accounts)
        } else {
            None
        }
    }

    fn system_transfer(program_id: Pubkey, data: &[u8], accounts: &[Pubkey]) -> Option<Self> {
        let instruction = bincode::deserialize::<SystemInstruction>(data).ok()?;
        let SystemInstruction::Transfer { lamports } = instruction else {
            return None;
        };
        let (from, to) = (*accounts.first()?, *accounts.get(1)?);
        Some(Self {
            program_id,
            source: from,
            destination: to,
            authority: from,
            amount: lamports,
            mint: None,
            decimals: None,
            extra_accounts: accounts[2..].to_vec(),
        })
    }

    fn token_transfer(program_id: Pubkey, data: &[u8], accounts: &[Pubkey]) -> Option<Self> {
        let instruction = spl_token::instruction::TokenInstruction::unpack(data).ok()?;
        let spl_token::instruction::TokenInstruction::TransferChecked { amount, decimals } =
            instruction
        else {
            return None;
        };
        Some(Self {
            program_id,
            source: *accounts.first()?,
            mint: Some(*accounts.get(1)?),
            destination: *accounts.get(2)?,
            authority: *accounts.get(3)?,
            amount,
            decimals: Some(decimals),
            extra_accounts: accounts[4..].to_vec(),
        })
    }
}

fn resolve_accounts(instruction: &CompiledInstruction, keys: &[Pubkey]) -> Option<Vec<Pubkey>> {
    instruction
        .accounts
        .iter()
        .map(|i| keys.get(usize::from(*i)).copied())
        .collect()
}

/// Computes signer/writable flags of the account at `index` from the header.
fn flags_at(message: &VersionedMessage, index: usize) -> AccountFlags {
    let header = message.header();
    let total = message.static_account_keys().len();
    let signers = usize::from(header.num_required_signatures);
    let readonly_signed = usize::from(header.num_readonly_signed_accounts);
    let readonly_unsigned = usize::from(header.num_readonly_unsigned_accounts);
    if index < signers {
        AccountFlags {
            is_signer: true,
            is_writable: index < signers.saturating_sub(readonly_signed),
        }
    } else {
        AccountFlags {
            is_signer: false,
            is_writable: index < total.saturating_sub(readonly_unsigned),
        }
    }
}

/// Returns `true` if any instruction of `message` lists `key` among its
/// accounts.
#[must_use]
pub fn message_mentions(message: &VersionedMessage, key: &Pubkey) -> bool {
    let Some(position) = message.static_account_keys().iter().position(|k| k == key) else {
        return false;
    };
    message
        .instructions()
        .iter()
        .any(|ix| ix.accounts.iter().any(|a| usize::from(*a) == position))
}

/// Index of the first instruction of `message` that lists `key`.
#[must_use]
pub fn instruction_mentioning(message: &VersionedMessage, key: &Pubkey) -> Option<usize> {
    let position = message.static_account_keys().iter().position(|k| k == key)?;
    message
        .instructions()
        .iter()
        .position(|ix| ix.accounts.iter().any(|a| usize::from(*a) == position))
}

/// A transaction ready for the buyer's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    inner: VersionedTransaction,
}

impl UnsignedTransaction {
    /// Wraps a message, reserving one zeroed signature slot per required
    /// signer.
    #[must_use]
    pub fn from_message(message: VersionedMessage) -> Self {
        let num_required = usize::from(message.header().num_required_signatures);
        Self {
            inner: VersionedTransaction {
                signatures: vec![Signature::default(); num_required],
                message,
            },
        }
    }

    /// Wraps an existing transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::SignatureCount`] if the signature vector does
    /// not match the header.
    pub fn try_new(transaction: VersionedTransaction) -> Result<Self, EncodingError> {
        let expected = usize::from(transaction.message.header().num_required_signatures);
        let found = transaction.signatures.len();
        if expected != found {
            return Err(EncodingError::SignatureCount { expected, found });
        }
        Ok(Self { inner: transaction })
    }

    /// Returns the inner transaction.
    #[must_use]
    pub const fn inner(&self) -> &VersionedTransaction {
        &self.inner
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_inner(self) -> VersionedTransaction {
        self.inner
    }

    /// Returns the compiled message.
    #[must_use]
    pub const fn message(&self) -> &VersionedMessage {
        &self.inner.message
    }

    /// First account key, which pays fees.
    #[must_use]
    pub fn fee_payer(&self) -> Option<Pubkey> {
        self.inner.message.static_account_keys().first().copied()
    }

    /// Blockhash the transaction is anchored to.
    #[must_use]
    pub fn anchor_blockhash(&self) -> Hash {
        *self.inner.message.recent_blockhash()
    }

    /// Signer and writable flags of `key`, if it appears in the message.
    #[must_use]
    pub fn account_flags(&self, key: &Pubkey) -> Option<AccountFlags> {
        let message = &self.inner.message;
        let index = message.static_account_keys().iter().position(|k| k == key)?;
        Some(flags_at(message, index))
    }

    /// Returns `true` if an instruction carries the reference.
    #[must_use]
    pub fn carries_reference(&self, reference: &Reference) -> bool {
        message_mentions(&self.inner.message, reference.pubkey())
    }

    /// Decodes the sole transfer instruction.
    ///
    /// Returns `None` unless the message holds exactly one instruction and it
    /// is a system transfer or an SPL `TransferChecked`.
    #[must_use]
    pub fn transfer(&self) -> Option<ParsedTransfer> {
        if self.inner.message.instructions().len() != 1 {
            return None;
        }
        ParsedTransfer::from_message(&self.inner.message, 0)
    }

    /// Checks if every required signature slot is filled.
    #[must_use]
    pub fn is_fully_signed(&self) -> bool {
        let num_required = usize::from(self.inner.message.header().num_required_signatures);
        if self.inner.signatures.len() < num_required {
            return false;
        }
        let default = Signature::default();
        self.inner.signatures.iter().all(|s| *s != default)
    }

    /// Transaction id, available once the fee payer has signed.
    #[must_use]
    pub fn signature(&self) -> Option<Signature> {
        self.inner
            .signatures
            .first()
            .copied()
            .filter(|s| *s != Signature::default())
    }

    /// Signs the message in place with `signer`.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionSignError`] if the signer is not a required signer
    /// or signing fails.
    pub fn sign_with<S: Signer + ?Sized>(self, signer: &S) -> Result<Self, TransactionSignError> {
        let mut tx = self.inner;
        let msg_bytes = tx.message.serialize();
        let signature = signer
            .try_sign_message(msg_bytes.as_slice())
            .map_err(|e| TransactionSignError(format!("{e}")))?;

        let num_required = usize::from(tx.message.header().num_required_signatures);
        let static_keys = tx.message.static_account_keys();
        let pubkey = signer
            .try_pubkey()
            .map_err(|e| TransactionSignError(format!("{e}")))?;
        let pos = static_keys
            .iter()
            .take(num_required)
            .position(|k| *k == pubkey)
            .ok_or_else(|| {
                TransactionSignError("Signer not found in required signers".to_string())
            })?;

        if tx.signatures.len() < num_required {
            tx.signatures.resize(num_required, Signature::default());
        }
        tx.signatures[pos] = signature;
        Ok(Self { inner: tx })
    }

    /// Serializes to the transport encoding.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::Serialize`] if bincode fails.
    pub fn encode(&self) -> Result<SerializedTransaction, EncodingError> {
        let bytes =
            bincode::serialize(&self.inner).map_err(|e| EncodingError::Serialize(format!("{e}")))?;
        Ok(SerializedTransaction(Base64Bytes::encode(bytes).into_string()))
    }
}

/// Base64 text of a bincode-serialized transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedTransaction(String);

impl SerializedTransaction {
    /// Wraps text received from the network. Validation happens on
    /// [`SerializedTransaction::decode`].
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the encoded text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Decodes back into an [`UnsignedTransaction`].
    ///
    /// # Errors
    ///
    /// Fails on invalid base64, malformed bytes, trailing bytes, or a
    /// signature vector that disagrees with the header.
    pub fn decode(&self) -> Result<UnsignedTransaction, EncodingError> {
        let bytes = Base64Bytes::from(self.0.as_str()).decode()?;
        let transaction = bincode::deserialize::<VersionedTransaction>(bytes.as_slice())
            .map_err(|e| EncodingError::Deserialize(e.to_string()))?;
        let consumed = bincode::serialized_size(&transaction)
            .map_err(|e| EncodingError::Deserialize(e.to_string()))?;
        let total = bytes.len() as u64;
        if consumed != total {
            return Err(EncodingError::TrailingBytes(total.saturating_sub(consumed)));
        }
        UnsignedTransaction::try_new(transaction)
    }
}

impl fmt::Display for SerializedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{native_transfer, token_transfer};
    use solana_keypair::Keypair;
    use solana_message::Message;

    #[test]
    fn test_encode_then_decode_is_bit_exact() {
        let buyer = Keypair::new().pubkey();
        let shop = Keypair::new().pubkey();
        let reference = Reference::generate();
        let tx = native_transfer(buyer, shop, 100_000_000, reference);

        let encoded = tx.encode().unwrap();
        let decoded = encoded.decode().unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.encode().unwrap(), encoded);

        let flags = decoded.account_flags(reference.pubkey()).unwrap();
        assert!(!flags.is_signer);
        assert!(!flags.is_writable);
        let buyer_flags = decoded.account_flags(&buyer).unwrap();
        assert!(buyer_flags.is_signer && buyer_flags.is_writable);
        let shop_flags = decoded.account_flags(&shop).unwrap();
        assert!(!shop_flags.is_signer && shop_flags.is_writable);
    }

    #[test]
    fn test_signature_slots_are_reserved() {
        let tx = native_transfer(
            Keypair::new().pubkey(),
            Keypair::new().pubkey(),
            1,
            Reference::generate(),
        );
        assert_eq!(tx.inner().signatures, vec![Signature::default()]);
        assert!(!tx.is_fully_signed());
        assert!(tx.signature().is_none());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let tx = native_transfer(
            Keypair::new().pubkey(),
            Keypair::new().pubkey(),
            1,
            Reference::generate(),
        );
        let mut bytes = bincode::serialize(tx.inner()).unwrap();
        bytes.push(0);
        let text = Base64Bytes::encode(bytes).into_string();
        let err = SerializedTransaction::new(text).decode().unwrap_err();
        assert!(matches!(err, EncodingError::TrailingBytes(1)));
    }

    #[test]
    fn test_decode_rejects_missing_signature_slots() {
        let tx = native_transfer(
            Keypair::new().pubkey(),
            Keypair::new().pubkey(),
            1,
            Reference::generate(),
        );
        let mut inner = tx.into_inner();
        inner.signatures.clear();
        let text = Base64Bytes::encode(bincode::serialize(&inner).unwrap()).into_string();
        let err = SerializedTransaction::new(text).decode().unwrap_err();
        assert!(matches!(
            err,
            EncodingError::SignatureCount {
                expected: 1,
                found: 0
            }
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            SerializedTransaction::new("!!!").decode(),
            Err(EncodingError::Base64(_))
        ));
        assert!(matches!(
            SerializedTransaction::new("AAAA").decode(),
            Err(EncodingError::Deserialize(_))
        ));
    }

    #[test]
    fn test_parse_native_transfer() {
        let buyer = Keypair::new().pubkey();
        let shop = Keypair::new().pubkey();
        let reference = Reference::generate();
        let tx = native_transfer(buyer, shop, 42, reference);
        let transfer = tx.transfer().unwrap();
        assert_eq!(transfer.program_id, solana_system_interface::program::ID);
        assert_eq!(transfer.source, buyer);
        assert_eq!(transfer.destination, shop);
        assert_eq!(transfer.amount, 42);
        assert_eq!(transfer.mint, None);
        assert_eq!(transfer.extra_accounts, vec![*reference.pubkey()]);
        assert!(tx.carries_reference(&reference));
        assert!(!tx.carries_reference(&Reference::generate()));
        assert_eq!(tx.fee_payer(), Some(buyer));
    }

    #[test]
    fn test_parse_token_transfer() {
        let buyer = Keypair::new().pubkey();
        let shop = Keypair::new().pubkey();
        let mint = Keypair::new().pubkey();
        let reference = Reference::generate();
        let tx = token_transfer(buyer, shop, mint, 6, 2_500_000, reference);
        let transfer = tx.transfer().unwrap();
        assert_eq!(transfer.program_id, spl_token::ID);
        assert_eq!(transfer.source, associated_token_address(&buyer, &mint));
        assert_eq!(transfer.destination, associated_token_address(&shop, &mint));
        assert_eq!(transfer.authority, buyer);
        assert_eq!(transfer.mint, Some(mint));
        assert_eq!(transfer.decimals, Some(6));
        assert_eq!(transfer.amount, 2_500_000);
        assert_eq!(transfer.extra_accounts, vec![*reference.pubkey()]);
    }

    #[test]
    fn test_sign_with_fills_fee_payer_slot() {
        let buyer = Keypair::new();
        let tx = native_transfer(
            buyer.pubkey(),
            Keypair::new().pubkey(),
            5,
            Reference::generate(),
        );
        let signed = tx.sign_with(&buyer).unwrap();
        assert!(signed.is_fully_signed());
        assert!(signed.signature().is_some());

        let stranger = Keypair::new();
        let tx = native_transfer(
            buyer.pubkey(),
            Keypair::new().pubkey(),
            5,
            Reference::generate(),
        );
        assert!(tx.sign_with(&stranger).is_err());
    }

    #[test]
    fn test_other_system_instructions_are_not_transfers() {
        let owner = Keypair::new().pubkey();
        let assign = solana_system_interface::instruction::assign(&owner, &spl_token::ID);
        let message = Message::new(&[assign], Some(&owner));
        let tx = UnsignedTransaction::from_message(VersionedMessage::Legacy(message));
        assert!(tx.transfer().is_none());
    }

    #[test]
    fn test_transfer_requires_single_instruction() {
        let buyer = Keypair::new().pubkey();
        let tx = native_transfer(buyer, Keypair::new().pubkey(), 5, Reference::generate());
        let message = match tx.message() {
            VersionedMessage::Legacy(m) => m.clone(),
            VersionedMessage::V0(_) => unreachable!(),
        };
        let doubled = Message {
            instructions: [message.instructions.clone(), message.instructions.clone()].concat(),
            ..message
        };
        let tx = UnsignedTransaction::from_message(VersionedMessage::Legacy(doubled));
        assert!(tx.transfer().is_none());
    }
}
