//! Loads the payer key pair.
//!
//! Accepts either a path to a JSON byte-array file, as written by the Solana
//! CLI, or the base58 secret itself (typically from an environment variable).

use solana_keypair::Keypair;
use std::path::Path;

/// Why a key pair could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum KeypairError {
    /// The key file could not be read.
    #[error("Failed to read key file: {0}")]
    Io(#[from] std::io::Error),
    /// The key file is not a JSON byte array.
    #[error("Invalid key file: {0}")]
    Json(#[from] serde_json::Error),
    /// The secret is not base58.
    #[error("Invalid base58 secret: {0}")]
    Base58(#[from] bs58::decode::Error),
    /// The bytes are not an ed25519 key pair.
    #[error("Invalid key pair: {0}")]
    Invalid(String),
}

/// Loads a key pair from a file path or a base58 secret.
///
/// # Errors
///
/// Returns [`KeypairError`] if neither form yields a valid key pair.
pub fn load_keypair(source: &str) -> Result<Keypair, KeypairError> {
    let source = source.trim();
    if Path::new(source).is_file() {
        let text = std::fs::read_to_string(source)?;
        return keypair_from_json(&text);
    }
    let bytes = bs58::decode(source).into_vec()?;
    keypair_from_bytes(&bytes)
}

/// Parses the JSON byte-array format.
///
/// # Errors
///
/// Returns [`KeypairError`] on malformed JSON or key bytes.
pub fn keypair_from_json(text: &str) -> Result<Keypair, KeypairError> {
    let bytes: Vec<u8> = serde_json::from_str(text)?;
    keypair_from_bytes(&bytes)
}

fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair, KeypairError> {
    Keypair::try_from(bytes).map_err(|e| KeypairError::Invalid(e.to_string()))
}
