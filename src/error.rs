use thiserror::Error;

/// Errors a Chain Fetcher collaborator reports back to the engine.
///
/// `PivotSwitched` is the one variant the engine treats as a normal signal
/// rather than a transient failure — it means continuing to query further
/// epochs in the current batch would be pointless since they'll be
/// reverted shortly.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("epoch {0} pivot switched during query")]
    PivotSwitched(u64),
    #[error("fetch failed: {0}")]
    Other(#[from] anyhow::Error),
}

/// Errors a Cache Store collaborator reports back to the engine.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("record not found")]
    NotFound,
    #[error("cache operation failed: {0}")]
    Other(#[from] anyhow::Error),
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound)
    }
}

/// Top-level engine error, covering invariant violations surfaced from the
/// core's own bookkeeping in addition to collaborator failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
