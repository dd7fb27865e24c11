//! Reference key generation.
//!
//! A reference is the public half of a throwaway key pair. The secret half is
//! dropped as soon as the key pair is created, so the reference can never sign
//! and never hold a balance; it only tags a transfer instruction so the settled
//! transaction can be found by anyone holding the reference.

use serde::{Deserialize, Serialize};
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use std::fmt;
use std::str::FromStr;

use crate::address::{Address, AddressFormatError};

/// A single-use lookup key attached to a payment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(Address);

impl Reference {
    /// Generates a fresh, unpredictable reference.
    #[must_use]
    pub fn generate() -> Self {
        let pubkey = Keypair::new().pubkey();
        Self(Address::new(pubkey))
    }

    /// Returns the reference as a public key.
    #[must_use]
    pub const fn pubkey(&self) -> &Pubkey {
        self.0.pubkey()
    }

    /// Returns the reference as an address.
    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.0
    }
}

impl From<Pubkey> for Reference {
    fn from(pubkey: Pubkey) -> Self {
        Self(Address::new(pubkey))
    }
}

impl FromStr for Reference {
    type Err = AddressFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_str(s).map(Self)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
