/// Cache Store collaborator: the persistence interface the engine drives.
/// Treated abstractly by the core; this module defines the trait plus an
/// in-memory reference implementation (`MemoryCacheStore`) used by the
/// demo binary and the engine's own test suite.
use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::epoch::Epoch;
use crate::error::CacheError;
use crate::types::{EpochData, PivotBlockSummary};

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Atomic append. Requires `batch[0].epoch == current_max + 1` or the
    /// store to be empty.
    async fn pushn(&self, batch: Vec<EpochData>) -> Result<(), CacheError>;
    /// Remove all epochs >= `epoch`. Idempotent.
    async fn popn(&self, epoch: Epoch) -> Result<(), CacheError>;
    async fn flush(&self) -> Result<(), CacheError>;
    async fn get_block_summary_by_epoch(&self, epoch: Epoch) -> Result<PivotBlockSummary, CacheError>;
    /// Returns `(min, max)` or `CacheError::NotFound` if the store is empty.
    async fn get_global_epoch_range(&self) -> Result<(Epoch, Epoch), CacheError>;
}

pub fn is_record_not_found(err: &CacheError) -> bool {
    err.is_not_found()
}

/// In-memory `CacheStore`, keyed by epoch, backed by a contiguous
/// `BTreeMap`. Suitable for the demo binary and for driving the engine's
/// own tests; not a production persistence layer — the abstract contract
/// (contiguous range, atomic per-call mutation) is what the engine relies
/// on, not this particular backing structure.
#[derive(Default)]
pub struct MemoryCacheStore {
    inner: Mutex<BTreeMap<Epoch, EpochData>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn pushn(&self, batch: Vec<EpochData>) -> Result<(), CacheError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut guard = self.inner.lock().unwrap();
        if let Some((&max, _)) = guard.iter().next_back() {
            if batch[0].pivot_block.epoch != max + 1 {
                return Err(CacheError::Other(anyhow::anyhow!(
                    "pushn batch must start at {}, got {}",
                    max + 1,
                    batch[0].pivot_block.epoch
                )));
            }
        }
        for data in batch {
            guard.insert(data.pivot_block.epoch, data);
        }
        Ok(())
    }

    async fn popn(&self, epoch: Epoch) -> Result<(), CacheError> {
        let mut guard = self.inner.lock().unwrap();
        guard.retain(|&e, _| e < epoch);
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.inner.lock().unwrap().clear();
        Ok(())
    }

    async fn get_block_summary_by_epoch(&self, epoch: Epoch) -> Result<PivotBlockSummary, CacheError> {
        self.inner
            .lock()
            .unwrap()
            .get(&epoch)
            .map(|d| d.pivot_block)
            .ok_or(CacheError::NotFound)
    }

    async fn get_global_epoch_range(&self) -> Result<(Epoch, Epoch), CacheError> {
        let guard = self.inner.lock().unwrap();
        let min = *guard.keys().next().ok_or(CacheError::NotFound)?;
        let max = *guard.keys().next_back().ok_or(CacheError::NotFound)?;
        Ok((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockHash, PivotBlockSummary};

    fn data(epoch: Epoch) -> EpochData {
        EpochData {
            pivot_block: PivotBlockSummary {
                epoch,
                hash: BlockHash([epoch as u8; 32]),
                parent_hash: BlockHash([(epoch.wrapping_sub(1)) as u8; 32]),
            },
            payload: vec![],
        }
    }

    #[tokio::test]
    async fn pushn_then_range_reflects_contiguous_span() {
        let store = MemoryCacheStore::new();
        store.pushn(vec![data(100), data(101), data(102)]).await.unwrap();
        assert_eq!(store.get_global_epoch_range().await.unwrap(), (100, 102));
    }

    #[tokio::test]
    async fn popn_removes_tail() {
        let store = MemoryCacheStore::new();
        store.pushn(vec![data(100), data(101), data(102)]).await.unwrap();
        store.popn(101).await.unwrap();
        assert_eq!(store.get_global_epoch_range().await.unwrap(), (100, 100));
    }

    #[tokio::test]
    async fn popn_twice_is_idempotent() {
        let store = MemoryCacheStore::new();
        store.pushn(vec![data(100), data(101)]).await.unwrap();
        store.popn(101).await.unwrap();
        store.popn(101).await.unwrap();
        assert_eq!(store.get_global_epoch_range().await.unwrap(), (100, 100));
    }

    #[tokio::test]
    async fn flush_empties_store() {
        let store = MemoryCacheStore::new();
        store.pushn(vec![data(100)]).await.unwrap();
        store.flush().await.unwrap();
        assert!(is_record_not_found(
            &store.get_global_epoch_range().await.unwrap_err()
        ));
    }

    #[tokio::test]
    async fn get_block_summary_not_found_for_missing_epoch() {
        let store = MemoryCacheStore::new();
        let err = store.get_block_summary_by_epoch(1).await.unwrap_err();
        assert!(is_record_not_found(&err));
    }
}
