//! Intent recording extension point.
//!
//! The builder never persists anything. A server that wants an order ledger
//! records each intent through [`IntentRecorder`] before replying to the
//! buyer. Persistence proper is out of scope; [`InMemoryIntentStore`] keeps
//! a bounded window of recent intents and enforces one set of terms per
//! reference within it.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::intent::PaymentIntent;
use crate::reference::Reference;

/// Why an intent could not be recorded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// The reference already names an intent with different terms.
    #[error("Reference {0} already used for different terms")]
    ReferenceReused(Reference),
}

/// Records intents at build time.
#[async_trait]
pub trait IntentRecorder: Send + Sync {
    /// Records `intent`. Recording the same terms twice is not an error.
    async fn record(&self, intent: &PaymentIntent) -> Result<(), RecordError>;
}

/// Discards every intent.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

#[async_trait]
impl IntentRecorder for NoopRecorder {
    async fn record(&self, _intent: &PaymentIntent) -> Result<(), RecordError> {
        Ok(())
    }
}

/// Intents kept by [`InMemoryIntentStore::new`].
pub const DEFAULT_INTENT_CAPACITY: usize = 10_000;

/// Process-local intent store keyed by reference.
///
/// Holds at most `capacity` intents. Recording a new reference into a full
/// store evicts the intent whose anchor expires first.
#[derive(Debug)]
pub struct InMemoryIntentStore {
    intents: DashMap<Reference, PaymentIntent>,
    capacity: usize,
}

impl Default for InMemoryIntentStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_INTENT_CAPACITY)
    }
}

impl InMemoryIntentStore {
    /// Creates an empty store holding up to [`DEFAULT_INTENT_CAPACITY`] intents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store holding up to `capacity` intents (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            intents: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Maximum number of intents kept.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every intent whose anchor expired before `block_height`.
    ///
    /// Such intents can no longer settle. Returns how many were dropped.
    pub fn prune_expired(&self, block_height: u64) -> usize {
        let before = self.intents.len();
        self.intents.retain(|_, intent| intent.anchor.last_valid_block_height >= block_height);
        let pruned = before.saturating_sub(self.intents.len());
        #[cfg(feature = "telemetry")]
        if pruned > 0 {
            tracing::debug!(pruned, block_height, "Pruned expired payment intents");
        }
        pruned
    }

    fn evict_oldest(&self) {
        let oldest = self
            .intents
            .iter()
            .min_by_key(|entry| entry.value().anchor.last_valid_block_height)
            .map(|entry| *entry.key());
        if let Some(reference) = oldest {
            self.intents.remove(&reference);
            #[cfg(feature = "telemetry")]
            tracing::debug!(%reference, "Evicted payment intent from full store");
        }
    }

    /// Looks up the intent recorded under `reference`.
    #[must_use]
    pub fn get(&self, reference: &Reference) -> Option<PaymentIntent> {
        self.intents.get(reference).map(|entry| entry.value().clone())
    }

    /// Number of recorded intents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

#[async_trait]
impl IntentRecorder for InMemoryIntentStore {
    async fn record(&self, intent: &PaymentIntent) -> Result<(), RecordError> {
        // Evict before taking the entry lock; iterating under it would deadlock.
        let is_new = !self.intents.contains_key(&intent.reference);
        if is_new && self.intents.len() >= self.capacity {
            self.evict_oldest();
        }
        match self.intents.entry(intent.reference) {
            Entry::Occupied(existing) => {
                if existing.get().same_terms(intent) {
                    Ok(())
                } else {
                    Err(RecordError::ReferenceReused(intent.reference))
                }
            }
            Entry::Vacant(slot) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(reference = %intent.reference, "Recorded payment intent");
                slot.insert(intent.clone());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<T: IntentRecorder + ?Sized> IntentRecorder for std::sync::Arc<T> {
    async fn record(&self, intent: &PaymentIntent) -> Result<(), RecordError> {
        (**self).record(intent).await
    }
}
