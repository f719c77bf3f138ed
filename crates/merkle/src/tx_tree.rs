use crate::TxProof;
use ledger_types::{Hash32, ProofScheme, SiblingOrder};

/// Binary Merkle tree over a block's transaction leaves.
///
/// An unpaired node at the end of a level is hashed with itself, so every
/// level of a proof has a sibling. Parents are always `H(left || right)`:
/// under [`SiblingOrder::RunningFirst`] only leaves that sit on the left at
/// every level have a provable path.
#[derive(Debug, Clone)]
pub struct TxMerkleTree {
    scheme: ProofScheme,
    /// Levels from the leaves (index 0) up to the single root.
    levels: Vec<Vec<Hash32>>,
    root: Hash32,
}

impl TxMerkleTree {
    /// Build a tree. Returns `None` for a block without transactions.
    pub fn build(scheme: ProofScheme, leaves: Vec<Hash32>) -> Option<Self> {
        let mut root = *leaves.first()?;
        let mut levels = vec![leaves];

        loop {
            let level = &levels[levels.len() - 1];
            if level.len() <= 1 {
                break;
            }
            let next: Vec<Hash32> = level
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    let right = pair.get(1).unwrap_or(left);
                    scheme.hash_pair(left, right)
                })
                .collect();
            root = next[0];
            levels.push(next);
        }

        Some(Self {
            scheme,
            levels,
            root,
        })
    }

    pub fn root(&self) -> Hash32 {
        self.root
    }

    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Proof for the leaf at `index`: the leaf followed by its siblings.
    ///
    /// `None` when the index is out of range, or when the scheme folds the
    /// running hash first and the leaf is a right child at some level.
    pub fn proof(&self, index: usize) -> Option<TxProof> {
        let leaf = *self.levels[0].get(index)?;
        let mut hashes = vec![leaf];
        let mut position = index;

        for level in &self.levels[..self.levels.len() - 1] {
            if position & 1 == 1 && self.scheme.sibling_order == SiblingOrder::RunningFirst {
                return None;
            }
            let sibling = level.get(position ^ 1).unwrap_or(&level[position]);
            hashes.push(*sibling);
            position >>= 1;
        }

        Some(TxProof::new(hashes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_proof::fold_siblings;

    const BY_INDEX: ProofScheme = ProofScheme::V1.with_sibling_order(SiblingOrder::IndexBits);

    fn leaves(n: usize) -> Vec<Hash32> {
        (0..n)
            .map(|i| ProofScheme::V1.digest(format!("tx-{i}").as_bytes()))
            .collect()
    }

    #[test]
    fn test_empty_tree() {
        assert!(TxMerkleTree::build(ProofScheme::V1, vec![]).is_none());
    }

    #[test]
    fn test_single_leaf_is_root() {
        let leaves = leaves(1);
        let tree = TxMerkleTree::build(ProofScheme::V1, leaves.clone()).unwrap();
        assert_eq!(tree.root(), leaves[0]);
        assert_eq!(tree.proof(0).unwrap().intermediate_hashes, vec![leaves[0]]);
    }

    #[test]
    fn test_odd_tree_proofs_reach_root() {
        let tree = TxMerkleTree::build(BY_INDEX, leaves(5)).unwrap();
        assert_eq!(tree.len(), 5);
        for index in 0..5 {
            let proof = tree.proof(index).unwrap();
            assert_eq!(proof.intermediate_hashes.len(), 4);
            let (leaf, siblings) = proof.intermediate_hashes.split_first().unwrap();
            assert_eq!(
                fold_siblings(&BY_INDEX, *leaf, index as u64, siblings),
                tree.root()
            );
        }
        assert!(tree.proof(5).is_none());
    }

    #[test]
    fn test_running_first_tree_proves_left_spine_only() {
        let scheme = ProofScheme::V1;
        let tree = TxMerkleTree::build(scheme, leaves(4)).unwrap();

        let proof = tree.proof(0).unwrap();
        let (leaf, siblings) = proof.intermediate_hashes.split_first().unwrap();
        assert_eq!(fold_siblings(&scheme, *leaf, 0, siblings), tree.root());

        for index in 1..4 {
            assert!(tree.proof(index).is_none());
        }
    }

    #[test]
    fn test_two_leaf_root() {
        let scheme = ProofScheme::V1;
        let leaves = leaves(2);
        let tree = TxMerkleTree::build(scheme, leaves.clone()).unwrap();
        assert_eq!(tree.root(), scheme.hash_pair(&leaves[0], &leaves[1]));
    }
}
