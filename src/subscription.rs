/// Validates the push-subscription stream of newly produced epochs before
/// it is forwarded into the engine's event channel.
///
/// `last_sub_epoch` is the single piece of shared mutable state in this
/// module and is guarded by an atomic so the subscription producer and
/// (conceptually) any inspector can read it without locking.
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::engine::CheckpointHandle;
use crate::epoch::{Epoch, EPOCH_NIL};
use crate::metrics;

/// Why an incoming epoch was accepted, for logging only — all three
/// outcomes result in the same action (store + forward).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    Initial,
    PivotSwitch,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    pub expected: Epoch,
    pub got: Epoch,
}

pub struct SubscriptionValidator {
    last_sub_epoch: AtomicU64,
    epoch_tx: mpsc::Sender<Epoch>,
    checkpoint: CheckpointHandle,
}

impl SubscriptionValidator {
    pub fn new(epoch_tx: mpsc::Sender<Epoch>, checkpoint: CheckpointHandle) -> Self {
        Self {
            last_sub_epoch: AtomicU64::new(EPOCH_NIL),
            epoch_tx,
            checkpoint,
        }
    }

    /// Truth table from the subscription validator:
    ///
    /// | prior state | incoming | outcome |
    /// |---|---|---|
    /// | EPOCH_NIL | any e | accept, initial |
    /// | L >= e | any e | accept, pivot-switch |
    /// | L+1 == e | e | accept, continuous |
    /// | otherwise | e | reject |
    pub fn validate(&self, new_epoch: Epoch) -> Result<Acceptance, Rejected> {
        let last = self.last_sub_epoch.load(Ordering::SeqCst);

        if last == EPOCH_NIL {
            self.last_sub_epoch.store(new_epoch, Ordering::SeqCst);
            return Ok(Acceptance::Initial);
        }
        if last >= new_epoch {
            self.last_sub_epoch.store(new_epoch, Ordering::SeqCst);
            return Ok(Acceptance::PivotSwitch);
        }
        if last + 1 == new_epoch {
            self.last_sub_epoch.store(new_epoch, Ordering::SeqCst);
            return Ok(Acceptance::Continuous);
        }

        Err(Rejected {
            expected: last + 1,
            got: new_epoch,
        })
    }

    /// Invoked by the subscription client per push. On validation failure
    /// the cursor is reset so the next event reseeds it; the event is not
    /// forwarded. On success, the epoch is forwarded to the engine's
    /// bounded channel — a full channel backpressures this call.
    pub async fn on_epoch_received(&self, new_epoch: Epoch) {
        match self.validate(new_epoch) {
            Ok(_acceptance) => {
                if self.epoch_tx.send(new_epoch).await.is_err() {
                    tracing::error!(new_epoch, "subscription channel closed, epoch dropped");
                }
            }
            Err(rejected) => {
                tracing::error!(
                    expected = rejected.expected,
                    got = rejected.got,
                    "bad incontinuous epoch from subscription"
                );
                metrics::SUBSCRIPTION_REJECTED.inc();
                self.last_sub_epoch.store(EPOCH_NIL, Ordering::SeqCst);
            }
        }
    }

    /// Invoked on subscription (re)establishment: resets the cursor and
    /// requests a checkpoint so the cached prefix is re-validated against
    /// upstream before new epochs are trusted.
    pub fn on_epoch_sub_start(&self) {
        tracing::debug!("subscription restarted, resetting cursor");
        self.last_sub_epoch.store(EPOCH_NIL, Ordering::SeqCst);
        self.checkpoint.trigger();
    }

    pub fn last_sub_epoch(&self) -> Epoch {
        self.last_sub_epoch.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> (SubscriptionValidator, mpsc::Receiver<Epoch>) {
        let (v, rx, _checkpoint_rx) = validator_with_checkpoint();
        (v, rx)
    }

    fn validator_with_checkpoint() -> (
        SubscriptionValidator,
        mpsc::Receiver<Epoch>,
        mpsc::Receiver<()>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let (checkpoint_tx, checkpoint_rx) = mpsc::channel(2);
        (
            SubscriptionValidator::new(tx, CheckpointHandle::new(checkpoint_tx)),
            rx,
            checkpoint_rx,
        )
    }

    #[test]
    fn initial_epoch_is_accepted() {
        let (v, _rx) = validator();
        assert_eq!(v.validate(100), Ok(Acceptance::Initial));
        assert_eq!(v.last_sub_epoch(), 100);
    }

    #[test]
    fn continuous_epoch_is_accepted() {
        let (v, _rx) = validator();
        v.validate(100).unwrap();
        assert_eq!(v.validate(101), Ok(Acceptance::Continuous));
    }

    #[test]
    fn reorg_to_earlier_or_equal_epoch_is_accepted_as_pivot_switch() {
        let (v, _rx) = validator();
        v.validate(100).unwrap();
        assert_eq!(v.validate(95), Ok(Acceptance::PivotSwitch));
        assert_eq!(v.last_sub_epoch(), 95);

        v.validate(95).unwrap();
        assert_eq!(v.validate(95), Ok(Acceptance::PivotSwitch));
    }

    #[test]
    fn skipped_epoch_is_rejected() {
        let (v, _rx) = validator();
        v.validate(100).unwrap();
        assert_eq!(
            v.validate(103),
            Err(Rejected {
                expected: 101,
                got: 103
            })
        );
    }

    #[tokio::test]
    async fn on_epoch_received_forwards_accepted_epochs() {
        let (v, mut rx) = validator();
        v.on_epoch_received(100).await;
        v.on_epoch_received(101).await;
        assert_eq!(rx.recv().await, Some(100));
        assert_eq!(rx.recv().await, Some(101));
    }

    #[tokio::test]
    async fn on_epoch_received_resets_cursor_on_rejection() {
        let (v, mut rx) = validator();
        v.on_epoch_received(100).await;
        v.on_epoch_received(150).await; // pivot switch, accepted
        rx.recv().await;
        rx.recv().await;

        // force a rejection by tampering with internal state via a gap
        v.last_sub_epoch.store(150, Ordering::SeqCst);
        v.on_epoch_received(200).await; // gap -> rejected
        assert_eq!(v.last_sub_epoch(), EPOCH_NIL);
    }

    #[test]
    fn on_epoch_sub_start_resets_cursor() {
        let (v, _rx) = validator();
        v.validate(100).unwrap();
        v.on_epoch_sub_start();
        assert_eq!(v.last_sub_epoch(), EPOCH_NIL);
    }

    #[test]
    fn on_epoch_sub_start_requests_a_checkpoint() {
        let (v, _rx, mut checkpoint_rx) = validator_with_checkpoint();
        v.on_epoch_sub_start();
        assert_eq!(checkpoint_rx.try_recv(), Ok(()));
    }
}
