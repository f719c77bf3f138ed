//! Data model shared by the ledger client crates.
//!
//! Blocks, receipts and transaction envelopes exactly as the server
//! produces and accepts them, plus the [`ProofScheme`] that fixes how they
//! are canonically encoded and hashed.

mod block;
mod scheme;
mod tx;

pub use block::*;
pub use scheme::*;
pub use tx::*;

use thiserror::Error;

/// A 32-byte hash value.
pub type Hash32 = [u8; 32];

/// Errors that can occur while producing canonical bytes.
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("json encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode encoding error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Convert a hash to hex string.
pub fn hash_to_hex(hash: &Hash32) -> String {
    hex::encode(hash)
}
