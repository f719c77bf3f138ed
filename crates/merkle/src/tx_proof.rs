use crate::ProofError;
use ledger_types::{Hash32, ProofScheme, SiblingOrder, TxEnvelope, TxReceipt, ValidationInfo};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

/// Leaf of the transaction tree: `H(envelope || validation_info)`.
pub fn tx_leaf_hash(
    scheme: &ProofScheme,
    envelope: &TxEnvelope,
    info: &ValidationInfo,
) -> Result<Hash32, ProofError> {
    let tx_bytes = envelope.canonical_bytes(scheme)?;
    let info_bytes = scheme.encode(info)?;
    Ok(scheme.digest_parts(&[&tx_bytes, &info_bytes]))
}

/// Path through a block's transaction tree.
///
/// The first hash is the transaction's leaf, every following hash is the
/// sibling at the next level up.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxProof {
    #[serde_as(as = "Vec<Hex>")]
    pub intermediate_hashes: Vec<Hash32>,
}

impl TxProof {
    pub fn new(intermediate_hashes: Vec<Hash32>) -> Self {
        Self {
            intermediate_hashes,
        }
    }

    /// Verify that `envelope` is the transaction at `receipt.tx_index` in the
    /// block whose header the receipt carries.
    pub fn verify(
        &self,
        scheme: &ProofScheme,
        receipt: &TxReceipt,
        envelope: &TxEnvelope,
    ) -> Result<bool, ProofError> {
        let header = &receipt.header;
        let info = receipt
            .validation_info()
            .ok_or(ProofError::IndexOutOfRange {
                index: receipt.tx_index,
                len: header.validation_info.len(),
            })?;
        let (first, siblings) = self
            .intermediate_hashes
            .split_first()
            .ok_or(ProofError::EmptyProof)?;

        let leaf = tx_leaf_hash(scheme, envelope, info)?;
        if *first != leaf {
            return Ok(false);
        }

        let root = fold_siblings(scheme, leaf, receipt.tx_index, siblings);
        Ok(root == header.tx_merkle_tree_root_hash)
    }
}

/// Climb from a leaf to the root, combining per the scheme's sibling order.
pub(crate) fn fold_siblings(
    scheme: &ProofScheme,
    leaf: Hash32,
    index: u64,
    siblings: &[Hash32],
) -> Hash32 {
    let mut current = leaf;
    let mut position = index;
    for sibling in siblings {
        current = match scheme.sibling_order {
            SiblingOrder::IndexBits if position & 1 == 1 => scheme.hash_pair(sibling, &current),
            _ => scheme.hash_pair(&current, sibling),
        };
        position >>= 1;
    }
    current
}
