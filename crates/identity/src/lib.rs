//! Identities for the ledger client.
//!
//! - [`KeyTable`]: the trusted node id to public key table, used to
//!   authenticate every signed server response
//! - [`UserSigner`]: the submitting user's signing key, used for transaction
//!   envelopes and queries
//!
//! Signatures are always checked over the bytes exactly as they arrived.
//! Callers must never decode a payload, re-encode it and verify the result.

use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use ed25519_dalek::PUBLIC_KEY_LENGTH;

/// Errors that can occur while loading keys or checking signatures.
#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("node {0} is not in the trusted key table")]
    UnknownNode(String),
    #[error("malformed signature: expected 64 bytes, got {0}")]
    MalformedSignature(usize),
    #[error("signature verification failed for node {0}")]
    InvalidSignature(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("duplicate identity {0}")]
    DuplicateIdentity(String),
    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Verifies a detached signature made by a known node.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, node_id: &str, payload: &[u8], signature: &[u8]) -> Result<(), SignatureError>;
}

/// Immutable table of trusted node keys.
#[derive(Debug, Clone, Default)]
pub struct KeyTable {
    keys: HashMap<String, VerifyingKey>,
}

impl KeyTable {
    /// Build a table from `(node_id, key)` pairs. Duplicate ids are rejected
    /// so a later entry can never silently replace a trusted key.
    pub fn new(
        entries: impl IntoIterator<Item = (String, VerifyingKey)>,
    ) -> Result<Self, SignatureError> {
        let mut keys = HashMap::new();
        for (node_id, key) in entries {
            if keys.contains_key(&node_id) {
                return Err(SignatureError::DuplicateIdentity(node_id));
            }
            keys.insert(node_id, key);
        }
        Ok(Self { keys })
    }

    /// Build a table from hex-encoded public keys.
    pub fn from_hex<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, SignatureError> {
        let parsed = entries
            .into_iter()
            .map(|(node_id, key_hex)| Ok((node_id.to_string(), parse_verifying_key(key_hex)?)))
            .collect::<Result<Vec<_>, SignatureError>>()?;
        Self::new(parsed)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl SignatureVerifier for KeyTable {
    fn verify(&self, node_id: &str, payload: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
        let key = self
            .keys
            .get(node_id)
            .ok_or_else(|| SignatureError::UnknownNode(node_id.to_string()))?;
        let signature = Signature::from_slice(signature)
            .map_err(|_| SignatureError::MalformedSignature(signature.len()))?;
        key.verify_strict(payload, &signature)
            .map_err(|_| SignatureError::InvalidSignature(node_id.to_string()))
    }
}

/// Parse a hex-encoded ed25519 public key.
pub fn parse_verifying_key(key_hex: &str) -> Result<VerifyingKey, SignatureError> {
    let bytes: [u8; PUBLIC_KEY_LENGTH] = hex::decode(key_hex.trim())
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))?
        .try_into()
        .map_err(|_| SignatureError::InvalidKey("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| SignatureError::InvalidKey(e.to_string()))
}

/// The submitting user's identity and signing key.
#[derive(Clone)]
pub struct UserSigner {
    user_id: String,
    key: SigningKey,
}

impl std::fmt::Debug for UserSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSigner")
            .field("user_id", &self.user_id)
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish()
    }
}

impl UserSigner {
    pub fn new(user_id: impl Into<String>, key: SigningKey) -> Self {
        Self {
            user_id: user_id.into(),
            key,
        }
    }

    /// Fresh random key, for tests and tooling.
    pub fn generate(user_id: impl Into<String>) -> Self {
        Self::new(user_id, SigningKey::generate(&mut OsRng))
    }

    /// Signer from a hex-encoded 32-byte seed.
    pub fn from_hex_seed(user_id: impl Into<String>, seed_hex: &str) -> Result<Self, SignatureError> {
        let seed: [u8; 32] = hex::decode(seed_hex.trim())
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))?
            .try_into()
            .map_err(|_| SignatureError::InvalidKey("signing seed must be 32 bytes".to_string()))?;
        Ok(Self::new(user_id, SigningKey::from_bytes(&seed)))
    }

    /// Load a hex-encoded seed from a file.
    pub fn load(user_id: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, SignatureError> {
        let path = path.as_ref();
        let seed_hex = std::fs::read_to_string(path).map_err(|source| SignatureError::KeyFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_hex_seed(user_id, &seed_hex)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.key.verifying_key().to_bytes()
    }

    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.key.sign(payload).to_bytes().to_vec()
    }
}
