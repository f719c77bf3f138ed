//! Block headers and transaction receipts.

use crate::{EncodingError, Hash32, ProofScheme};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

/// Number of the first block in every ledger.
pub const GENESIS_BLOCK: u64 = 1;

/// Chain linkage shared by every header.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BaseHeader {
    pub number: u64,
    #[serde_as(as = "Hex")]
    pub previous_base_header_hash: Hash32,
    #[serde_as(as = "Hex")]
    pub last_committed_block_hash: Hash32,
    pub last_committed_block_num: u64,
}

/// A block header as produced by the server.
///
/// `skipchain_hashes` holds the hashes of earlier headers at exponentially
/// growing distances; see `merkle::skiplist_targets`.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    pub base_header: BaseHeader,
    #[serde_as(as = "Vec<Hex>")]
    pub skipchain_hashes: Vec<Hash32>,
    #[serde_as(as = "Hex")]
    pub tx_merkle_tree_root_hash: Hash32,
    #[serde_as(as = "Hex")]
    pub state_merkle_tree_root_hash: Hash32,
    pub validation_info: Vec<ValidationInfo>,
}

impl BlockHeader {
    pub fn number(&self) -> u64 {
        self.base_header.number
    }

    /// Hash of the header's canonical encoding, as stored in later
    /// headers' skip lists.
    pub fn hash(&self, scheme: &ProofScheme) -> Result<Hash32, EncodingError> {
        scheme.hash_value(self)
    }
}

/// Outcome code the server assigned to a transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationFlag {
    Valid,
    InvalidDatabaseDoesNotExist,
    InvalidNoPermission,
    InvalidIncorrectEntries,
    InvalidUnauthorised,
    InvalidMisformed,
    InvalidMvccConflictWithinBlock,
    InvalidMvccConflictWithCommittedState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationInfo {
    pub flag: ValidationFlag,
    #[serde(default)]
    pub reason_if_invalid: String,
}

impl ValidationInfo {
    pub fn valid() -> Self {
        Self {
            flag: ValidationFlag::Valid,
            reason_if_invalid: String::new(),
        }
    }

    pub fn invalid(flag: ValidationFlag, reason: impl Into<String>) -> Self {
        Self {
            flag,
            reason_if_invalid: reason.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flag == ValidationFlag::Valid
    }
}

/// Where a transaction landed: the header of its block and its index there.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxReceipt {
    pub header: BlockHeader,
    pub tx_index: u64,
}

impl TxReceipt {
    pub fn block_number(&self) -> u64 {
        self.header.number()
    }

    /// Validation info recorded for this transaction, if the index is in range.
    pub fn validation_info(&self) -> Option<&ValidationInfo> {
        usize::try_from(self.tx_index)
            .ok()
            .and_then(|index| self.header.validation_info.get(index))
    }
}
