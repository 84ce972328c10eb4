/// Shared data types: block hashes, pivot block summaries, and the epoch
/// data bundle the Chain Fetcher returns.
use std::fmt;

use crate::epoch::Epoch;

/// A 32-byte block hash, displayed as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub const ZERO: BlockHash = BlockHash([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self)
    }
}

/// The canonical block of an epoch, as observed from the Chain Fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PivotBlockSummary {
    pub epoch: Epoch,
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
}

impl PivotBlockSummary {
    /// Two summaries at consecutive epochs are continuous iff the later
    /// one's parent hash matches the earlier one's hash.
    pub fn is_continuous_to(&self, previous: &PivotBlockSummary) -> (bool, &'static str) {
        if self.parent_hash == previous.hash {
            (true, "continuous")
        } else {
            (false, "parent hash does not match previous pivot hash")
        }
    }
}

/// One epoch's worth of data as returned by the Chain Fetcher. The payload
/// is opaque to the engine — it is handed to the Cache Store unexamined.
#[derive(Debug, Clone)]
pub struct EpochData {
    pub pivot_block: PivotBlockSummary,
    pub payload: Vec<u8>,
}

impl EpochData {
    pub fn is_continuous_to(&self, previous: &EpochData) -> (bool, &'static str) {
        self.pivot_block.is_continuous_to(&previous.pivot_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_lowercase_hex() {
        let h = BlockHash([0xabu8; 32]);
        assert_eq!(h.to_string(), "ab".repeat(32));
    }

    #[test]
    fn continuity_checks_parent_hash_chain() {
        let a = PivotBlockSummary {
            epoch: 1,
            hash: BlockHash([1u8; 32]),
            parent_hash: BlockHash::ZERO,
        };
        let b = PivotBlockSummary {
            epoch: 2,
            hash: BlockHash([2u8; 32]),
            parent_hash: BlockHash([1u8; 32]),
        };
        let c = PivotBlockSummary {
            epoch: 2,
            hash: BlockHash([2u8; 32]),
            parent_hash: BlockHash([9u8; 32]),
        };
        assert!(b.is_continuous_to(&a).0);
        assert!(!c.is_continuous_to(&a).0);
    }
}
