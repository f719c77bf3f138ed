use crate::ProofError;
use ledger_types::{BlockHeader, ProofScheme, GENESIS_BLOCK};
use serde::{Deserialize, Serialize};

/// Headers linking two blocks, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerPath {
    pub headers: Vec<BlockHeader>,
}

impl LedgerPath {
    pub fn new(headers: Vec<BlockHeader>) -> Self {
        Self { headers }
    }

    pub fn verify(&self, scheme: &ProofScheme) -> Result<bool, ProofError> {
        verify_path(scheme, &self.headers)
    }

    pub fn newest(&self) -> Option<&BlockHeader> {
        self.headers.first()
    }

    pub fn oldest(&self) -> Option<&BlockHeader> {
        self.headers.last()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Check that every header in `path` is reachable from its predecessor
/// through a skip-list hash. The path runs from the newest block to the
/// oldest.
pub fn verify_path(scheme: &ProofScheme, path: &[BlockHeader]) -> Result<bool, ProofError> {
    match path {
        [] => return Err(ProofError::EmptyPath),
        [single] => {
            return Err(ProofError::SinglePointPath {
                block: single.number(),
            })
        }
        _ => {}
    }

    for pair in path.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        let hash_to_find = next.hash(scheme)?;
        if !current.skipchain_hashes.contains(&hash_to_find) {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Blocks whose header hashes block `number` stores in its skip list.
///
/// Block `n` links to `n - 2^i` for every `i` with `(n - 1) % 2^i == 0`,
/// nearest first. The genesis block links to nothing.
pub fn skiplist_targets(number: u64) -> Vec<u64> {
    let mut targets = Vec::new();
    if number <= GENESIS_BLOCK {
        return targets;
    }

    let mut distance = 1u64;
    while distance < number
        && number - distance >= GENESIS_BLOCK
        && (number - 1) % distance == 0
    {
        targets.push(number - distance);
        match distance.checked_mul(2) {
            Some(next) => distance = next,
            None => break,
        }
    }
    targets
}

/// Block numbers of the shortest skip-list walk from `end` down to `start`,
/// newest first. Empty when `start > end`.
pub fn skiplist_path(start: u64, end: u64) -> Vec<u64> {
    if start > end || start < GENESIS_BLOCK {
        return Vec::new();
    }

    let mut path = vec![end];
    let mut current = end;
    while current > start {
        // Nearest target always qualifies, so the walk terminates.
        current = skiplist_targets(current)
            .into_iter()
            .filter(|target| *target >= start)
            .min()
            .unwrap_or(current - 1);
        path.push(current);
    }
    path
}
