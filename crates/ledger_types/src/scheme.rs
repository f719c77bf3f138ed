//! Versioned hashing and canonical encoding.
//!
//! Every hash a proof is checked against is computed over a canonical byte
//! encoding chosen by the server's protocol version. Verifiers never assume a
//! fixed pair: they take a [`ProofScheme`] and derive both from it.

use crate::{EncodingError, Hash32};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

/// Hash function used for leaves, inner nodes and block headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashFunction {
    #[default]
    Sha256,
    Sha3_256,
}

/// Canonical encoding of structured values before hashing or signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Json,
    Bincode,
}

/// How a transaction proof combines the running hash with each sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiblingOrder {
    /// `H(running || sibling)` at every level, whatever the leaf position.
    #[default]
    RunningFirst,
    /// Bit `k` of the leaf index places the running hash at level `k`:
    /// left when 0, right when 1.
    IndexBits,
}

/// The hash/encoding contract negotiated with a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProofScheme {
    #[serde(default)]
    pub hash: HashFunction,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub sibling_order: SiblingOrder,
}

impl ProofScheme {
    /// Protocol version 1: SHA-256 over JSON.
    pub const V1: ProofScheme = ProofScheme {
        hash: HashFunction::Sha256,
        encoding: Encoding::Json,
        sibling_order: SiblingOrder::RunningFirst,
    };

    pub fn new(hash: HashFunction, encoding: Encoding) -> Self {
        Self {
            hash,
            encoding,
            sibling_order: SiblingOrder::default(),
        }
    }

    pub const fn with_sibling_order(mut self, sibling_order: SiblingOrder) -> Self {
        self.sibling_order = sibling_order;
        self
    }

    /// Content type of request bodies under this scheme's encoding.
    pub fn content_type(&self) -> &'static str {
        match self.encoding {
            Encoding::Json => "application/json",
            Encoding::Bincode => "application/octet-stream",
        }
    }

    /// Hash a single byte string.
    pub fn digest(&self, data: &[u8]) -> Hash32 {
        self.digest_parts(&[data])
    }

    /// Hash the concatenation of `parts` without materializing it.
    pub fn digest_parts(&self, parts: &[&[u8]]) -> Hash32 {
        match self.hash {
            HashFunction::Sha256 => {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update(part);
                }
                hasher.finalize().into()
            }
            HashFunction::Sha3_256 => {
                let mut hasher = Sha3_256::new();
                for part in parts {
                    hasher.update(part);
                }
                hasher.finalize().into()
            }
        }
    }

    /// Order-sensitive combination of two hashes: `H(left || right)`.
    pub fn hash_pair(&self, left: &Hash32, right: &Hash32) -> Hash32 {
        self.digest_parts(&[left, right])
    }

    /// Canonical bytes of a value.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, EncodingError> {
        match self.encoding {
            Encoding::Json => Ok(serde_json::to_vec(value)?),
            Encoding::Bincode => Ok(bincode::serialize(value)?),
        }
    }

    /// Decode a value from its canonical bytes.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, EncodingError> {
        match self.encoding {
            Encoding::Json => Ok(serde_json::from_slice(bytes)?),
            Encoding::Bincode => Ok(bincode::deserialize(bytes)?),
        }
    }

    /// Hash of a value's canonical bytes.
    pub fn hash_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<Hash32, EncodingError> {
        Ok(self.digest(&self.encode(value)?))
    }
}
