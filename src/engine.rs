/// Synchronizer Engine: the top-level event loop reconciling a push
/// subscription and a pull-based batch fetcher against the cache, under a
/// pivot-chain reorganization model.
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;

use crate::cache_store::CacheStore;
use crate::config::SyncSettings;
use crate::epoch::{Epoch, EpochWindow};
use crate::error::{EngineError, FetchError};
use crate::fetcher::ChainFetcher;
use crate::metrics;
use crate::pivot_ring::PivotInfoRing;
use crate::subscription::SubscriptionValidator;
use crate::types::EpochData;

/// Delegated external routine that validates and repairs the cached prefix
/// against upstream before the engine trusts it. Implementation-defined
/// and must be idempotent; a no-op implementation is provided for
/// deployments with nothing to repair.
#[async_trait]
pub trait ConsistencyChecker: Send + Sync {
    async fn ensure_consistency(&self) -> Result<(), EngineError>;
}

pub struct NoopConsistencyChecker;

#[async_trait]
impl ConsistencyChecker for NoopConsistencyChecker {
    async fn ensure_consistency(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Handle to request an on-demand checkpoint. Cheap to clone and hand to
/// other tasks (e.g. an HTTP admin endpoint, or the subscription client on
/// reconnect).
#[derive(Clone)]
pub struct CheckpointHandle {
    tx: mpsc::Sender<()>,
}

impl CheckpointHandle {
    pub fn new(tx: mpsc::Sender<()>) -> Self {
        Self { tx }
    }

    /// Non-blocking, coalescing: if a checkpoint is already queued this is
    /// a no-op, mirroring `triggerCheckpoint`'s `len(ch) == 0` guard.
    pub fn trigger(&self) {
        let _ = self.tx.try_send(());
    }
}

pub struct Engine {
    fetcher: Arc<dyn ChainFetcher>,
    cache: Arc<dyn CacheStore>,
    consistency: Arc<dyn ConsistencyChecker>,
    settings: SyncSettings,

    window: EpochWindow,
    ring: PivotInfoRing,

    epoch_rx: mpsc::Receiver<Epoch>,
    checkpoint_rx: mpsc::Receiver<()>,
    checkpoint_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
}

impl Engine {
    /// Builds the engine plus the handles external collaborators use to
    /// feed it: a `SubscriptionValidator` to forward push events through,
    /// and a `CheckpointHandle` to request reconciliation.
    pub fn new(
        fetcher: Arc<dyn ChainFetcher>,
        cache: Arc<dyn CacheStore>,
        settings: SyncSettings,
        cancel: CancellationToken,
    ) -> (Self, Arc<SubscriptionValidator>, CheckpointHandle) {
        Self::with_consistency_checker(
            fetcher,
            cache,
            Arc::new(NoopConsistencyChecker),
            settings,
            cancel,
        )
    }

    pub fn with_consistency_checker(
        fetcher: Arc<dyn ChainFetcher>,
        cache: Arc<dyn CacheStore>,
        consistency: Arc<dyn ConsistencyChecker>,
        settings: SyncSettings,
        cancel: CancellationToken,
    ) -> (Self, Arc<SubscriptionValidator>, CheckpointHandle) {
        let (epoch_tx, epoch_rx) = mpsc::channel(settings.sub_buffer);
        let (checkpoint_tx, checkpoint_rx) = mpsc::channel(2);

        let ring = PivotInfoRing::new(settings.pivot_ring_capacity);
        let window = EpochWindow::new(settings.decay_threshold);

        let engine = Self {
            fetcher,
            cache,
            consistency,
            settings,
            window,
            ring,
            epoch_rx,
            checkpoint_rx,
            checkpoint_tx: checkpoint_tx.clone(),
            cancel,
        };

        let checkpoint_handle = CheckpointHandle::new(checkpoint_tx.clone());
        let validator = Arc::new(SubscriptionValidator::new(
            epoch_tx,
            checkpoint_handle.clone(),
        ));

        (engine, validator, checkpoint_handle)
    }

    pub fn checkpoint_handle(&self) -> CheckpointHandle {
        CheckpointHandle {
            tx: self.checkpoint_tx.clone(),
        }
    }

    /// Startup sequence: ensure consistency, then load the sync cursor from
    /// the cache's global epoch range.
    pub async fn startup(&mut self) -> Result<(), EngineError> {
        self.consistency.ensure_consistency().await?;
        self.load_cursor().await?;
        Ok(())
    }

    async fn load_cursor(&mut self) -> Result<(), EngineError> {
        match self.cache.get_global_epoch_range().await {
            Ok((_min, max)) => {
                self.window.reset(max + 1, max);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(EngineError::Cache(e)),
        }
    }

    /// The two-tier select loop. High-priority tier (cancellation,
    /// checkpoint) is polled non-blocking first so a saturated event/timer
    /// path can never starve shutdown or reconciliation. Exactly one case
    /// is handled per iteration of the second tier.
    pub async fn run(mut self) {
        tracing::info!(window = %self.window, "synchronizer engine starting");

        let mut timer: Option<tokio::time::Interval> = None;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("synchronizer engine shutdown ok");
                return;
            }

            match self.checkpoint_rx.try_recv() {
                Ok(()) => {
                    self.run_checkpoint().await;
                    continue;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }

            let tick = async {
                match timer.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("synchronizer engine shutdown ok");
                    return;
                }
                Some(()) = self.checkpoint_rx.recv() => {
                    self.run_checkpoint().await;
                }
                Some(new_epoch) = self.epoch_rx.recv() => {
                    if let Err(err) = self.handle_new_epoch(new_epoch, &mut timer).await {
                        timer = None;
                        tracing::error!(new_epoch, error = %err, "failed to handle new received epoch");
                    }
                }
                _ = tick => {
                    let timer_instant = metrics::Timer::new();
                    let result = self.sync_once().await;
                    timer_instant.observe(&metrics::SYNC_ONCE_DURATION);

                    if let Err(err) = result {
                        tracing::error!(error = %err, "synchronizer failed to sync epoch data");
                    }

                    if self.window.is_empty() {
                        timer = None;
                    }
                }
            }
        }
    }

    async fn run_checkpoint(&mut self) {
        match self.do_checkpoint().await {
            Ok(()) => {
                metrics::CHECKPOINT_TOTAL.inc();
            }
            Err(err) => {
                tracing::error!(error = %err, "synchronizer failed to do checkpoint");
                metrics::CHECKPOINT_FAILURES.inc();
                self.checkpoint_handle().trigger();
            }
        }
    }

    /// Triggered by subscription start/restart, explicit request, or
    /// self-retrigger on failure.
    async fn do_checkpoint(&mut self) -> Result<(), EngineError> {
        tracing::info!(window = %self.window, "ensuring epoch data validity on checkpoint");

        self.consistency.ensure_consistency().await?;
        self.load_cursor().await?;
        self.ring.popn(self.window.from());

        Ok(())
    }

    /// Handles one epoch pushed through the validated subscription stream:
    /// overflow, pivot-switch, or plain extend — then adjusts cadence.
    async fn handle_new_epoch(
        &mut self,
        new_epoch: Epoch,
        timer: &mut Option<tokio::time::Interval>,
    ) -> Result<(), EngineError> {
        if self.window.peek_will_overflow(new_epoch) {
            tracing::info!(new_epoch, "sync window overflow detected");
            metrics::REORG_EVENTS.with_label_values(&["overflow"]).inc();
            self.cache.flush().await.map_err(EngineError::Cache)?;
            self.window.reset(new_epoch, new_epoch);
        } else if self.window.peek_will_pivot_switch(new_epoch) {
            tracing::info!(new_epoch, "pivot switch detected");
            metrics::REORG_EVENTS.with_label_values(&["pivot_switch"]).inc();
            self.pivot_switch_revert(new_epoch).await?;
        } else {
            self.window.update_to(new_epoch);
        }

        self.rearm_timer(timer);
        Ok(())
    }

    fn rearm_timer(&self, timer: &mut Option<tokio::time::Interval>) {
        let size = self.window.size();
        if size == 0 {
            *timer = None;
        } else if size > self.settings.max_epochs {
            let mut interval = tokio::time::interval(self.settings.interval_catchup);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            *timer = Some(interval);
        } else {
            let mut interval = tokio::time::interval(self.settings.interval_normal);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            *timer = Some(interval);
        }
        metrics::SYNC_WINDOW_SIZE.set(size as i64);
    }

    /// Revert the cache and ring to `revert_to`, then reset the window.
    /// Rejects `revert_to == 0` as a protocol error (genesis must not be
    /// reverted).
    async fn pivot_switch_revert(&mut self, revert_to: Epoch) -> Result<(), EngineError> {
        if revert_to == 0 {
            return Err(EngineError::InvariantViolation(
                "genesis epoch must not be reverted".to_string(),
            ));
        }

        tracing::info!(revert_to, window = %self.window, "reverting epoch data due to pivot chain switch");

        self.cache
            .popn(revert_to)
            .await
            .map_err(EngineError::Cache)?;
        self.ring.popn(revert_to);
        self.window.reset(revert_to, revert_to);

        Ok(())
    }

    /// One fetch-and-commit batch. Skipped if the window is empty.
    async fn sync_once(&mut self) -> Result<(), EngineError> {
        if self.window.is_empty() {
            tracing::debug!(window = %self.window, "sync_once skipped with empty window");
            return Ok(());
        }

        let (sync_from, sync_size) = self.window.peek_shrink_from(self.settings.max_epochs);
        tracing::debug!(sync_from, sync_size, "starting to sync epoch(s)");

        let mut batch: Vec<EpochData> = Vec::with_capacity(sync_size as usize);

        for i in 0..sync_size {
            let epoch_no = sync_from + i;

            let data = match self
                .fetcher
                .query_epoch_data(epoch_no, self.settings.use_batch)
                .await
            {
                Ok(data) => data,
                Err(FetchError::PivotSwitched(_)) => {
                    tracing::info!(epoch = epoch_no, "pivot switched during query, stopping batch");
                    break;
                }
                Err(other) => return Err(EngineError::Fetch(other)),
            };

            if i == 0 {
                let latest_pivot_hash = self.get_store_latest_pivot_hash().await?;

                if let Some(latest_hash) = latest_pivot_hash {
                    if data.pivot_block.parent_hash != latest_hash {
                        let latest_store_epoch = self.latest_store_epoch();
                        tracing::info!(
                            epoch = epoch_no,
                            latest_store_epoch,
                            "parent hash mismatch at batch boundary, reverting"
                        );
                        metrics::REORG_EVENTS
                            .with_label_values(&["parent_hash_mismatch"])
                            .inc();
                        self.pivot_switch_revert(latest_store_epoch).await?;
                        return Ok(());
                    }
                }
            } else {
                let (continuous, desc) = data.is_continuous_to(&batch[(i - 1) as usize]);
                if !continuous {
                    // Truncate to the previous known-good epoch, per the
                    // documented (if debatable) upstream behavior: the
                    // boundary itself is treated as suspect.
                    batch.truncate((i - 1) as usize);
                    tracing::info!(epoch = epoch_no, i, desc, "truncated batch due to non-continuous epoch");
                    metrics::REORG_EVENTS
                        .with_label_values(&["non_continuous_batch"])
                        .inc();
                    break;
                }
            }

            batch.push(data);
        }

        metrics::SYNC_ONCE_BATCH_SIZE.observe(batch.len() as f64);

        if batch.is_empty() {
            tracing::debug!("sync_once skipped due to empty sync range");
            return Ok(());
        }

        let batch_len = batch.len() as u64;
        let summaries: Vec<_> = batch.iter().map(|d| d.pivot_block).collect();

        self.cache
            .pushn(batch)
            .await
            .map_err(EngineError::Cache)?;

        for summary in summaries {
            if self.ring.push(summary).is_err() {
                tracing::info!("failed to push pivot block into ring, resetting");
                self.ring.reset();
                break;
            }
        }

        let (new_from, remaining) = self.window.shrink_from(batch_len);
        metrics::SYNC_WINDOW_SIZE.set(remaining as i64);
        metrics::PIVOT_RING_SIZE.set(self.ring.len() as i64);
        tracing::debug!(new_from, remaining, "succeeded to sync epoch data range");

        Ok(())
    }

    async fn get_store_latest_pivot_hash(
        &self,
    ) -> Result<Option<crate::types::BlockHash>, EngineError> {
        if !self.window.is_set() {
            return Ok(None);
        }

        let latest_epoch = self.latest_store_epoch();

        if let Some(hash) = self.ring.get_pivot_hash(latest_epoch) {
            return Ok(Some(hash));
        }

        match self.cache.get_block_summary_by_epoch(latest_epoch).await {
            Ok(summary) => Ok(Some(summary.hash)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(EngineError::Cache(e)),
        }
    }

    fn latest_store_epoch(&self) -> Epoch {
        if self.window.from() > 0 {
            self.window.from() - 1
        } else {
            0
        }
    }
}
