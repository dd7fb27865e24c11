//! Where the checkout gets its unsigned transaction from.

use async_trait::async_trait;
use std::sync::Arc;

use crate::address::Address;
use crate::builder::{BuiltTransaction, TransactionBuilder, TransferRequest};
use crate::catalog::{Catalog, Selection};
use crate::error::CheckoutError;
use crate::ledger::LedgerClient;
use crate::recorder::{IntentRecorder, NoopRecorder};
use crate::reference::Reference;
use crate::transaction::UnsignedTransaction;

/// What the buyer is paying for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Products and quantities.
    pub selection: Selection,
    /// Reference the transaction must carry.
    pub reference: Reference,
    /// Buyer wallet; pays the fee and signs.
    pub buyer: Address,
}

/// Produces unsigned transactions for orders.
///
/// The result is untrusted: the checkout checks it before asking the buyer to
/// sign.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Requests an unsigned transaction for `order`.
    async fn request_transaction(
        &self,
        order: &Order,
    ) -> Result<UnsignedTransaction, CheckoutError>;
}

#[async_trait]
impl<T: TransactionSource + ?Sized> TransactionSource for Arc<T> {
    async fn request_transaction(
        &self,
        order: &Order,
    ) -> Result<UnsignedTransaction, CheckoutError> {
        (**self).request_transaction(order).await
    }
}

/// Prices orders against a catalog and builds transactions in process.
///
/// This is the engine behind the transaction-request endpoint and also serves
/// as a [`TransactionSource`] when merchant and buyer share a process.
#[derive(Debug, Clone)]
pub struct LocalTransactionSource<L, R = NoopRecorder> {
    catalog: Arc<Catalog>,
    builder: TransactionBuilder<L>,
    recorder: R,
}

impl<L> LocalTransactionSource<L> {
    /// Creates a source that records nothing.
    pub fn new(catalog: Arc<Catalog>, builder: TransactionBuilder<L>) -> Self {
        Self {
            catalog,
            builder,
            recorder: NoopRecorder,
        }
    }
}

impl<L, R> LocalTransactionSource<L, R> {
    /// Replaces the intent recorder.
    pub fn with_recorder<R2>(self, recorder: R2) -> LocalTransactionSource<L, R2> {
        LocalTransactionSource {
            catalog: self.catalog,
            builder: self.builder,
            recorder,
        }
    }

    /// The product table.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The wrapped builder.
    pub const fn builder(&self) -> &TransactionBuilder<L> {
        &self.builder
    }
}

impl<L: LedgerClient, R: IntentRecorder> LocalTransactionSource<L, R> {
    /// Prices `selection`, builds the transaction and records its intent.
    ///
    /// # Errors
    ///
    /// Validation errors in order: unknown product, zero charge, missing
    /// reference, missing account, inexact amount. Then ledger and recorder
    /// failures.
    pub async fn quote(
        &self,
        selection: &Selection,
        reference: Option<Reference>,
        buyer: Option<Address>,
    ) -> Result<BuiltTransaction, CheckoutError> {
        let amount = self.catalog.total(selection)?;
        let built = self
            .builder
            .build(TransferRequest {
                buyer,
                amount,
                reference,
            })
            .await?;
        self.recorder.record(&built.intent).await?;
        Ok(built)
    }
}

#[async_trait]
impl<L: LedgerClient, R: IntentRecorder> TransactionSource for LocalTransactionSource<L, R> {
    async fn request_transaction(
        &self,
        order: &Order,
    ) -> Result<UnsignedTransaction, CheckoutError> {
        let built = self
            .quote(&order.selection, Some(order.reference), Some(order.buyer))
            .await?;
        Ok(built.transaction)
    }
}
