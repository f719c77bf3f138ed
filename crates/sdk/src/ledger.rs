//! Ledger queries and end-to-end transaction proofs.
//!
//! Every reply is authenticated before anything is decoded from it. The
//! proofs themselves are only trusted after the pure verifiers in
//! [`merkle`] accept them.

use crate::replica::Replica;
use crate::response::{
    authenticate, GetBlockResponse, GetDataProofResponse, GetLedgerPathResponse,
    GetTxProofResponse, GetTxReceiptResponse,
};
use crate::{LedgerError, SessionShared};
use ledger_types::{BlockHeader, Hash32, TxEnvelope, TxReceipt, GENESIS_BLOCK};
use merkle::{key_value_hash, DataProof, LedgerPath, TxProof};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use transport::{rejection_message, SignedQuery, STATUS_OK};

/// What a query signature covers.
#[derive(Serialize)]
struct QueryPayload<'a> {
    user_id: &'a str,
    path: &'a str,
}

/// Proofs gathered for one transaction, kept so they can be re-verified
/// later without fetching them again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullTxProof {
    /// True only if every constituent proof and anchor checked out.
    pub verified: bool,
    pub tx_proof: TxProof,
    /// From the transaction's block down to genesis. `None` for a
    /// transaction in the genesis block.
    pub path_to_genesis: Option<LedgerPath>,
    /// From the trusted anchor down to the transaction's block. `None` when
    /// the anchor is the transaction's block.
    pub path_from_anchor: Option<LedgerPath>,
}

/// Ledger query client bound to a session.
#[derive(Clone)]
pub struct Ledger {
    shared: Arc<SessionShared>,
}

impl Ledger {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    async fn query<T: DeserializeOwned>(&self, path: &str) -> Result<T, LedgerError> {
        let shared = &self.shared;
        let replica: &Replica = shared
            .selector
            .select(&shared.replicas)
            .ok_or(LedgerError::NoReplica)?;
        let url = replica.endpoint(path)?;

        let user_id = shared.signer.user_id();
        let payload = shared.scheme.encode(&QueryPayload { user_id, path })?;
        let query = SignedQuery {
            user_id: user_id.to_string(),
            signature: shared.signer.sign(&payload),
        };

        debug!("Querying {} from replica {}", path, replica.id);
        let exchange = shared.transport.query(&url, &query);
        let response = match shared.query_timeout {
            Some(deadline) => tokio::time::timeout(deadline, exchange)
                .await
                .map_err(|_| LedgerError::Timeout(deadline))??,
            None => exchange.await?,
        };

        if response.status != STATUS_OK {
            return Err(LedgerError::RemoteRejected {
                status: response.status,
                message: rejection_message(&response.body),
            });
        }

        authenticate(shared.verifier.as_ref(), replica, &response.body).map_err(|e| {
            warn!("Rejecting reply to {} from {}: {}", path, replica.id, e);
            LedgerError::from(e)
        })
    }

    pub async fn block_header(&self, number: u64) -> Result<BlockHeader, LedgerError> {
        let response: GetBlockResponse = self.query(&format!("/ledger/block/{number}")).await?;
        if response.block_header.number() != number {
            return Err(LedgerError::MalformedResponse(format!(
                "asked for block {number}, got block {}",
                response.block_header.number()
            )));
        }
        Ok(response.block_header)
    }

    pub async fn last_block_header(&self) -> Result<BlockHeader, LedgerError> {
        let response: GetBlockResponse = self.query("/ledger/block/last").await?;
        Ok(response.block_header)
    }

    /// Headers linking block `end` down to block `start`, newest first.
    ///
    /// Only the endpoints are checked here; call [`LedgerPath::verify`] for
    /// the skip-list links.
    pub async fn ledger_path(&self, start: u64, end: u64) -> Result<LedgerPath, LedgerError> {
        if start < GENESIS_BLOCK || start > end {
            return Err(LedgerError::InvalidArgument(format!(
                "invalid path range {start}..={end}"
            )));
        }

        let response: GetLedgerPathResponse = self
            .query(&format!("/ledger/path?start={start}&end={end}"))
            .await?;
        let path = LedgerPath::new(response.block_headers);

        let endpoints = (
            path.newest().map(BlockHeader::number),
            path.oldest().map(BlockHeader::number),
        );
        if endpoints != (Some(end), Some(start)) {
            return Err(LedgerError::MalformedResponse(format!(
                "path for {start}..={end} runs {:?}..={:?}",
                endpoints.1, endpoints.0
            )));
        }
        Ok(path)
    }

    /// Merkle path of the transaction at `tx_index` in block `block`.
    pub async fn tx_proof(&self, block: u64, tx_index: u64) -> Result<TxProof, LedgerError> {
        let response: GetTxProofResponse = self
            .query(&format!("/ledger/proof/tx/{block}?idx={tx_index}"))
            .await?;
        Ok(TxProof::new(response.hashes))
    }

    pub async fn tx_receipt(&self, tx_id: &str) -> Result<TxReceipt, LedgerError> {
        if tx_id.is_empty() || !tx_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(LedgerError::InvalidArgument(format!("invalid transaction id {tx_id:?}")));
        }
        let response: GetTxReceiptResponse = self
            .query(&format!("/ledger/tx/receipt/{tx_id}"))
            .await?;
        Ok(response.receipt)
    }

    /// State-trie path for `key` in `db_name` as of block `block`.
    pub async fn data_proof(
        &self,
        block: u64,
        db_name: &str,
        key: &str,
        is_deleted: bool,
    ) -> Result<DataProof, LedgerError> {
        if db_name.is_empty() || db_name.contains(['/', '?', '#', '%']) {
            return Err(LedgerError::InvalidArgument(format!("invalid database name {db_name:?}")));
        }
        let path = format!(
            "/ledger/proof/data/{db_name}/{}?block={block}&deleted={is_deleted}",
            hex::encode(key)
        );
        let response: GetDataProofResponse = self.query(&path).await?;
        Ok(DataProof::new(response.path))
    }

    /// Check that `key` held `value` in `db_name` as of a trusted `header`.
    pub async fn verify_value(
        &self,
        header: &BlockHeader,
        db_name: &str,
        key: &str,
        value: &[u8],
        is_deleted: bool,
    ) -> Result<bool, LedgerError> {
        let scheme = &self.shared.scheme;
        let proof = self
            .data_proof(header.number(), db_name, key, is_deleted)
            .await?;
        let kv_hash = key_value_hash(scheme, db_name, key, value);
        Ok(proof.verify(scheme, &kv_hash, &header.state_merkle_tree_root_hash, is_deleted)?)
    }

    /// Prove that `envelope` is committed at `receipt` and that its block is
    /// linked both to genesis and to `last_known`, a header the caller
    /// already trusts.
    ///
    /// Fetch and decode failures are errors. A proof that does not check out
    /// yields `verified: false`.
    pub async fn full_tx_proof_and_verify(
        &self,
        receipt: &TxReceipt,
        last_known: &BlockHeader,
        envelope: &TxEnvelope,
    ) -> Result<FullTxProof, LedgerError> {
        let scheme = self.shared.scheme;
        let tx_block = receipt.block_number();
        let anchor_block = last_known.number();
        if anchor_block < tx_block {
            return Err(LedgerError::InvalidArgument(format!(
                "trusted block {anchor_block} precedes transaction block {tx_block}"
            )));
        }

        let receipt_hash = receipt.header.hash(&scheme)?;
        let anchor_hash = last_known.hash(&scheme)?;

        let tx_proof = self.tx_proof(tx_block, receipt.tx_index).await?;
        let in_block = tx_proof.verify(&scheme, receipt, envelope)?;
        debug!("Transaction {} inclusion in block {}: {}", envelope.tx_id(), tx_block, in_block);

        let (path_to_genesis, genesis_linked) = if tx_block > GENESIS_BLOCK {
            let path = self.ledger_path(GENESIS_BLOCK, tx_block).await?;
            let linked = path.verify(&scheme)?
                && header_matches(path.newest(), &receipt_hash, &scheme)?
                && path.oldest().map(BlockHeader::number) == Some(GENESIS_BLOCK);
            (Some(path), linked)
        } else {
            (None, true)
        };

        let (path_from_anchor, anchor_linked) = if anchor_block > tx_block {
            let path = self.ledger_path(tx_block, anchor_block).await?;
            let linked = path.verify(&scheme)?
                && header_matches(path.newest(), &anchor_hash, &scheme)?
                && header_matches(path.oldest(), &receipt_hash, &scheme)?;
            (Some(path), linked)
        } else {
            (None, anchor_hash == receipt_hash)
        };

        let verified = in_block && genesis_linked && anchor_linked;
        info!(
            "Full proof of transaction {} (block {}, anchor {}): {}",
            envelope.tx_id(),
            tx_block,
            anchor_block,
            if verified { "verified" } else { "rejected" }
        );

        Ok(FullTxProof {
            verified,
            tx_proof,
            path_to_genesis,
            path_from_anchor,
        })
    }
}

fn header_matches(
    header: Option<&BlockHeader>,
    expected: &Hash32,
    scheme: &ledger_types::ProofScheme,
) -> Result<bool, LedgerError> {
    match header {
        Some(header) => Ok(header.hash(scheme)? == *expected),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_chain, signed_response, MockReply, MockTransport, TestNet};
    use crate::response::ResponseHeader;
    use ledger_types::{
        DataTx, DataTxEnvelope, DbOperation, ProofScheme, SiblingOrder, ValidationInfo,
    };
    use merkle::{skiplist_path, tx_leaf_hash, TrieProofNode, TxMerkleTree};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use transport::{RawResponse, Url};

    const TX_BLOCK: u64 = 6;

    fn envelope(tx_id: &str) -> TxEnvelope {
        TxEnvelope::Data(DataTxEnvelope {
            payload: DataTx {
                must_sign_user_ids: vec!["alice".to_string()],
                tx_id: tx_id.to_string(),
                db_operations: vec![DbOperation {
                    db_name: "bdb".to_string(),
                    ..Default::default()
                }],
            },
            signatures: BTreeMap::from([("alice".to_string(), vec![7u8; 64])]),
        })
    }

    /// A ten block chain whose block 6 commits three transactions, the
    /// second of which is `tx-b`. Tree proofs place siblings by index bits.
    struct Fixture {
        net: TestNet,
        headers: Vec<BlockHeader>,
        tree: TxMerkleTree,
    }

    impl Fixture {
        fn new() -> Self {
            let mut net = TestNet::new();
            let scheme = ProofScheme::V1.with_sibling_order(SiblingOrder::IndexBits);
            net.connection.scheme = scheme;
            let infos = vec![ValidationInfo::valid(); 3];
            let leaves = ["tx-a", "tx-b", "tx-c"]
                .iter()
                .zip(&infos)
                .map(|(id, info)| tx_leaf_hash(&scheme, &envelope(id), info).unwrap())
                .collect();
            let tree = TxMerkleTree::build(scheme, leaves).unwrap();

            let root = tree.root();
            let headers = build_chain(&scheme, 10, |header| {
                if header.number() == TX_BLOCK {
                    header.tx_merkle_tree_root_hash = root;
                    header.validation_info = infos.clone();
                }
            });
            Self { net, headers, tree }
        }

        fn header(&self, number: u64) -> &BlockHeader {
            &self.headers[(number - 1) as usize]
        }

        fn receipt(&self) -> TxReceipt {
            TxReceipt {
                header: self.header(TX_BLOCK).clone(),
                tx_index: 1,
            }
        }

        /// Replica that answers from the fixture chain.
        fn transport(&self, tamper: impl Fn(&mut Vec<BlockHeader>) + Send + Sync + 'static) -> Arc<MockTransport> {
            let node = self.net.node.clone();
            let headers = self.headers.clone();
            let proof = self.tree.proof(1).unwrap();
            MockTransport::routed(move |url: &Url| {
                let header = ResponseHeader {
                    node_id: "node1".to_string(),
                };
                let path = url.path();
                let body = if path == "/ledger/path" {
                    let param = |name: &str| {
                        url.query_pairs()
                            .find(|(k, _)| k == name)
                            .and_then(|(_, v)| v.parse::<u64>().ok())
                            .unwrap_or_default()
                    };
                    let mut block_headers: Vec<BlockHeader> = skiplist_path(param("start"), param("end"))
                        .into_iter()
                        .map(|n| headers[(n - 1) as usize].clone())
                        .collect();
                    tamper(&mut block_headers);
                    signed_response(&node, &GetLedgerPathResponse { header, block_headers })
                } else if path.starts_with("/ledger/proof/tx/") {
                    signed_response(
                        &node,
                        &GetTxProofResponse {
                            header,
                            hashes: proof.intermediate_hashes.clone(),
                        },
                    )
                } else if let Some(n) = path.strip_prefix("/ledger/block/") {
                    let block_header = match n.parse::<u64>() {
                        Ok(n) => headers[(n - 1) as usize].clone(),
                        Err(_) => headers[headers.len() - 1].clone(),
                    };
                    signed_response(&node, &GetBlockResponse { header, block_header })
                } else {
                    return MockReply::Respond(RawResponse::new(404, br#"{"error":"not found"}"#.to_vec()));
                };
                MockReply::Respond(RawResponse::new(200, body))
            })
        }
    }

    #[tokio::test]
    async fn test_full_proof_verifies() {
        let fixture = Fixture::new();
        let session = fixture.net.session(fixture.transport(|_| {}));
        let ledger = session.ledger();

        let anchor = ledger.last_block_header().await.unwrap();
        assert_eq!(anchor.number(), 10);

        let proof = ledger
            .full_tx_proof_and_verify(&fixture.receipt(), &anchor, &envelope("tx-b"))
            .await
            .unwrap();
        assert!(proof.verified);
        assert_eq!(proof.path_to_genesis.as_ref().unwrap().oldest().unwrap().number(), 1);
        assert_eq!(proof.path_from_anchor.as_ref().unwrap().newest().unwrap().number(), 10);
    }

    #[tokio::test]
    async fn test_full_proof_rejects_wrong_envelope() {
        let fixture = Fixture::new();
        let session = fixture.net.session(fixture.transport(|_| {}));
        let anchor = fixture.header(10).clone();

        let proof = session
            .ledger()
            .full_tx_proof_and_verify(&fixture.receipt(), &anchor, &envelope("tx-a"))
            .await
            .unwrap();
        assert!(!proof.verified);
    }

    #[tokio::test]
    async fn test_full_proof_rejects_unlinked_anchor() {
        let fixture = Fixture::new();
        let session = fixture.net.session(fixture.transport(|_| {}));
        let mut anchor = fixture.header(10).clone();
        anchor.state_merkle_tree_root_hash = [9u8; 32];

        let proof = session
            .ledger()
            .full_tx_proof_and_verify(&fixture.receipt(), &anchor, &envelope("tx-b"))
            .await
            .unwrap();
        assert!(!proof.verified);
    }

    #[tokio::test]
    async fn test_full_proof_rejects_tampered_path() {
        let fixture = Fixture::new();
        let transport = fixture.transport(|headers| {
            if let Some(middle) = headers.get_mut(1) {
                middle.state_merkle_tree_root_hash = [0xEE; 32];
            }
        });
        let session = fixture.net.session(transport);

        let proof = session
            .ledger()
            .full_tx_proof_and_verify(&fixture.receipt(), fixture.header(10), &envelope("tx-b"))
            .await
            .unwrap();
        assert!(!proof.verified);
    }

    #[tokio::test]
    async fn test_anchor_at_tx_block_needs_no_anchor_path() {
        let fixture = Fixture::new();
        let session = fixture.net.session(fixture.transport(|_| {}));

        let proof = session
            .ledger()
            .full_tx_proof_and_verify(&fixture.receipt(), fixture.header(TX_BLOCK), &envelope("tx-b"))
            .await
            .unwrap();
        assert!(proof.verified);
        assert!(proof.path_from_anchor.is_none());
    }

    #[tokio::test]
    async fn test_anchor_older_than_tx_block_rejected() {
        let fixture = Fixture::new();
        let session = fixture.net.session(fixture.transport(|_| {}));

        let result = session
            .ledger()
            .full_tx_proof_and_verify(&fixture.receipt(), fixture.header(3), &envelope("tx-b"))
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_ledger_path_endpoints_checked() {
        let fixture = Fixture::new();
        let transport = fixture.transport(|headers| {
            headers.pop();
        });
        let session = fixture.net.session(transport);

        let result = session.ledger().ledger_path(1, 9).await;
        assert!(matches!(result, Err(LedgerError::MalformedResponse(_))));
        assert!(matches!(
            session.ledger().ledger_path(5, 4).await,
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_queries_are_signed_by_user() {
        let fixture = Fixture::new();
        let transport = fixture.transport(|_| {});
        let session = fixture.net.session(transport.clone());

        session.ledger().block_header(4).await.unwrap();
        let call = &transport.calls()[0];
        let query = call.query.as_ref().unwrap();
        assert_eq!(query.user_id, "alice");

        let payload = ProofScheme::V1
            .encode(&QueryPayload {
                user_id: "alice",
                path: "/ledger/block/4",
            })
            .unwrap();
        let users = identity::KeyTable::new([("alice".to_string(), fixture.net.user.verifying_key())]).unwrap();
        identity::SignatureVerifier::verify(&users, "alice", &payload, &query.signature).unwrap();
    }

    #[tokio::test]
    async fn test_rejected_query() {
        let fixture = Fixture::new();
        let session = fixture.net.session(fixture.transport(|_| {}));
        let result = session.ledger().tx_receipt("missing").await;
        match result {
            Err(LedgerError::RemoteRejected { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "not found");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_query_deadline() {
        let mut net = TestNet::new();
        net.config.query_timeout = Duration::from_millis(20);
        let session = net.session(MockTransport::new(MockReply::Hang));
        assert!(matches!(
            session.ledger().last_block_header().await,
            Err(LedgerError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_value() {
        let net = TestNet::new();
        let scheme = ProofScheme::V1;
        let kv_hash = key_value_hash(&scheme, "bdb", "key1", b"value1");
        let value_node = TrieProofNode::new(vec![[1u8; 32], kv_hash]);
        let root_node = TrieProofNode::new(vec![value_node.hash(&scheme), [2u8; 32]]);
        let state_root = root_node.hash(&scheme);

        let mut header = build_chain(&scheme, 2, |_| {}).remove(1);
        header.state_merkle_tree_root_hash = state_root;

        let node = net.node.clone();
        let transport = MockTransport::routed(move |url: &Url| {
            assert_eq!(url.path(), format!("/ledger/proof/data/bdb/{}", hex::encode("key1")));
            let body = signed_response(
                &node,
                &GetDataProofResponse {
                    header: ResponseHeader {
                        node_id: "node1".to_string(),
                    },
                    path: vec![value_node.clone(), root_node.clone()],
                },
            );
            MockReply::Respond(RawResponse::new(200, body))
        });
        let ledger = net.session(transport).ledger();

        assert!(ledger.verify_value(&header, "bdb", "key1", b"value1", false).await.unwrap());
        assert!(!ledger.verify_value(&header, "bdb", "key1", b"value2", false).await.unwrap());
        assert!(!ledger.verify_value(&header, "bdb", "key1", b"value1", true).await.unwrap());
        assert!(matches!(
            ledger.data_proof(2, "a/b", "key1", false).await,
            Err(LedgerError::InvalidArgument(_))
        ));
    }
}
