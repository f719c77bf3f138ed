//! Proof verification for the ledger client.
//!
//! This crate provides three independent, side-effect-free verifiers:
//! - [`TxProof`]: a transaction's inclusion in its block's transaction tree
//! - [`verify_path`]: skip-list linkage between two block headers
//! - [`DataProof`]: a key/value's presence (or deletion) in a state trie
//!
//! Every verifier separates two outcomes. `Ok(false)` means the proof was
//! evaluated and the cryptographic claim is false. `Err(_)` means the input
//! was malformed and the claim could not be evaluated at all.

mod data_proof;
mod ledger_path;
mod tx_proof;
mod tx_tree;

pub use data_proof::{composite_key, key_value_hash, tombstone_hash, DataProof, TrieProofNode, DELETED_MARKER};
pub use ledger_path::{skiplist_path, skiplist_targets, verify_path, LedgerPath};
pub use tx_proof::{tx_leaf_hash, TxProof};
pub use tx_tree::TxMerkleTree;

pub use ledger_types::Hash32;

use ledger_types::EncodingError;
use thiserror::Error;

/// Malformed verification input.
#[derive(Error, Debug)]
pub enum ProofError {
    #[error("proof contains no hashes")]
    EmptyProof,
    #[error("transaction index {index} out of range, block holds {len} transactions")]
    IndexOutOfRange { index: u64, len: usize },
    #[error("impossible to validate empty path in ledger")]
    EmptyPath,
    #[error("ledger path composed from single block {block} is impossible to validate")]
    SinglePointPath { block: u64 },
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
}
