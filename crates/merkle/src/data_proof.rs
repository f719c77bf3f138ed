//! State trie proofs.
//!
//! A proof is the path of Merkle-Patricia trie nodes from the node holding a
//! value up to the root. Each node is given as the ordered list of hashes it
//! commits to (child hashes in nibble order, compressed-prefix hashes,
//! value hashes), so the verifier reproduces the server's node hash by
//! hashing that list in order regardless of how many children the node has.

use crate::ProofError;
use ledger_types::{Hash32, ProofScheme};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

/// Marker the trie stores next to a value that has been deleted.
pub const DELETED_MARKER: &[u8] = b"__deleted__";

/// Key under which a database entry is stored in the state trie.
pub fn composite_key(db_name: &str, key: &str) -> Vec<u8> {
    let mut composite = Vec::with_capacity(db_name.len() + key.len() + 1);
    composite.extend_from_slice(db_name.as_bytes());
    composite.push(0x00);
    composite.extend_from_slice(key.as_bytes());
    composite
}

/// `H(composite_key || value)`, the hash a value node commits to.
pub fn key_value_hash(scheme: &ProofScheme, db_name: &str, key: &str, value: &[u8]) -> Hash32 {
    scheme.digest_parts(&[&composite_key(db_name, key), value])
}

pub fn tombstone_hash(scheme: &ProofScheme) -> Hash32 {
    scheme.digest(DELETED_MARKER)
}

/// One trie node, reduced to the hashes it commits to.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrieProofNode {
    #[serde_as(as = "Vec<Hex>")]
    pub hashes: Vec<Hash32>,
}

impl TrieProofNode {
    pub fn new(hashes: Vec<Hash32>) -> Self {
        Self { hashes }
    }

    pub fn hash(&self, scheme: &ProofScheme) -> Hash32 {
        let parts: Vec<&[u8]> = self.hashes.iter().map(|h| h.as_slice()).collect();
        scheme.digest_parts(&parts)
    }

    fn contains(&self, hash: &Hash32) -> bool {
        self.hashes.contains(hash)
    }
}

/// Path from a value node to the trie root.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataProof {
    pub path: Vec<TrieProofNode>,
}

impl DataProof {
    pub fn new(path: Vec<TrieProofNode>) -> Self {
        Self { path }
    }

    /// Verify that `kv_hash` is committed under `root`.
    ///
    /// With `is_deleted` the value node must carry the tombstone marker;
    /// without it the marker must be absent, so a deleted entry cannot be
    /// passed off as live.
    pub fn verify(
        &self,
        scheme: &ProofScheme,
        kv_hash: &Hash32,
        root: &Hash32,
        is_deleted: bool,
    ) -> Result<bool, ProofError> {
        let value_node = self.path.first().ok_or(ProofError::EmptyProof)?;
        if value_node.contains(&tombstone_hash(scheme)) != is_deleted {
            return Ok(false);
        }

        let mut hash_to_find = *kv_hash;
        for node in &self.path {
            if !node.contains(&hash_to_find) {
                return Ok(false);
            }
            hash_to_find = node.hash(scheme);
        }

        Ok(hash_to_find == *root)
    }
}
