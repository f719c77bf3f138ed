//! Signed response envelopes.
//!
//! A replica answers every successful request with
//! `{"response": {...}, "signature": "<base64>"}`. The signature covers the
//! `response` member byte for byte as it appears on the wire, so the member
//! is kept as a raw slice and verified before anything is decoded from it.

use crate::replica::Replica;
use identity::{SignatureError, SignatureVerifier};
use ledger_types::{BlockHeader, Hash32, TxReceipt};
use merkle::TrieProofNode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_with::{base64::Base64, hex::Hex, serde_as};
use thiserror::Error;

/// Errors that can occur while authenticating a response.
#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("responding node {declared} is not the contacted replica {expected}")]
    UnexpectedNode { expected: String, declared: String },
    #[error("signature verification failed for node {node_id}: {source}")]
    Untrusted {
        node_id: String,
        source: SignatureError,
    },
}

impl ResponseError {
    /// Node identity the failure concerns, if one was declared.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            ResponseError::Malformed(_) => None,
            ResponseError::UnexpectedNode { declared, .. } => Some(declared),
            ResponseError::Untrusted { node_id, .. } => Some(node_id),
        }
    }
}

#[serde_as]
#[derive(Deserialize)]
struct SignedResponse {
    response: Box<RawValue>,
    #[serde_as(as = "Base64")]
    signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseHeader {
    pub node_id: String,
}

#[derive(Deserialize)]
struct HeaderOnly {
    header: ResponseHeader,
}

/// Authenticate a signed response from `replica` and decode its payload.
///
/// The declared node must be the replica that was contacted and must hold a
/// trusted key; the signature is checked over the received bytes.
pub fn authenticate<T: DeserializeOwned>(
    verifier: &dyn SignatureVerifier,
    replica: &Replica,
    body: &[u8],
) -> Result<T, ResponseError> {
    let signed: SignedResponse = serde_json::from_slice(body)?;
    let raw = signed.response.get().as_bytes();
    let HeaderOnly { header } = serde_json::from_slice(raw)?;

    if header.node_id != replica.id {
        return Err(ResponseError::UnexpectedNode {
            expected: replica.id.clone(),
            declared: header.node_id,
        });
    }

    verifier
        .verify(&header.node_id, raw, &signed.signature)
        .map_err(|source| ResponseError::Untrusted {
            node_id: header.node_id.clone(),
            source,
        })?;

    Ok(serde_json::from_slice(raw)?)
}

/// Reply to a transaction submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxReceiptResponse {
    pub header: ResponseHeader,
    /// Absent for asynchronous submissions.
    #[serde(default)]
    pub receipt: Option<TxReceipt>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetBlockResponse {
    pub header: ResponseHeader,
    pub block_header: BlockHeader,
}

/// Headers from the end block down to the start block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetLedgerPathResponse {
    pub header: ResponseHeader,
    pub block_headers: Vec<BlockHeader>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetTxProofResponse {
    pub header: ResponseHeader,
    #[serde_as(as = "Vec<Hex>")]
    pub hashes: Vec<Hash32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetTxReceiptResponse {
    pub header: ResponseHeader,
    pub receipt: TxReceipt,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetDataProofResponse {
    pub header: ResponseHeader,
    pub path: Vec<TrieProofNode>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use identity::{KeyTable, UserSigner};

    fn setup() -> (UserSigner, KeyTable, Replica) {
        let node = UserSigner::generate("node1");
        let table = KeyTable::new([("node1".to_string(), node.verifying_key())]).unwrap();
        let replica = Replica::new("node1", "http://127.0.0.1:6001").unwrap();
        (node, table, replica)
    }

    fn wrap(response: &str, signature: &[u8]) -> Vec<u8> {
        format!(
            r#"{{"response":{},"signature":"{}"}}"#,
            response,
            BASE64.encode(signature)
        )
        .into_bytes()
    }

    #[test]
    fn test_authenticates_exact_bytes() {
        let (node, table, replica) = setup();
        // Whitespace and key order as a server might emit them.
        let response = r#"{ "receipt": null,  "header": {"node_id": "node1"} }"#;
        let body = wrap(response, &node.sign(response.as_bytes()));

        let decoded: TxReceiptResponse = authenticate(&table, &replica, &body).unwrap();
        assert_eq!(decoded.header.node_id, "node1");
        assert!(decoded.receipt.is_none());
    }

    #[test]
    fn test_semantically_equal_rewrite_rejected() {
        let (node, table, replica) = setup();
        let signed = r#"{"header":{"node_id":"node1"},"receipt":null}"#;
        let reordered = r#"{"receipt":null,"header":{"node_id":"node1"}}"#;
        let body = wrap(reordered, &node.sign(signed.as_bytes()));

        let result: Result<TxReceiptResponse, _> = authenticate(&table, &replica, &body);
        assert!(matches!(result, Err(ResponseError::Untrusted { .. })));
    }

    #[test]
    fn test_node_must_match_contacted_replica() {
        let (_, _, replica) = setup();
        let rogue = UserSigner::generate("node2");
        let table = KeyTable::new([("node2".to_string(), rogue.verifying_key())]).unwrap();
        let response = r#"{"header":{"node_id":"node2"}}"#;
        let body = wrap(response, &rogue.sign(response.as_bytes()));

        let result: Result<TxReceiptResponse, _> = authenticate(&table, &replica, &body);
        assert!(matches!(
            result,
            Err(ResponseError::UnexpectedNode { ref declared, .. }) if declared == "node2"
        ));
    }

    #[test]
    fn test_untrusted_node_rejected() {
        let (_, _, replica) = setup();
        let stranger = UserSigner::generate("node1");
        let table = KeyTable::default();
        let response = r#"{"header":{"node_id":"node1"}}"#;
        let body = wrap(response, &stranger.sign(response.as_bytes()));

        let result: Result<TxReceiptResponse, _> = authenticate(&table, &replica, &body);
        let err = result.unwrap_err();
        assert_eq!(err.node_id(), Some("node1"));
        assert!(matches!(
            err,
            ResponseError::Untrusted {
                source: SignatureError::UnknownNode(_),
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_body() {
        let (_, table, replica) = setup();
        let result: Result<TxReceiptResponse, _> = authenticate(&table, &replica, b"not json");
        assert!(matches!(result, Err(ResponseError::Malformed(_))));
    }
}
