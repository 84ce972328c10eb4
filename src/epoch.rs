/// Epoch number and sliding sync window.
///
/// A half-open `[from, to]` range tracking the epochs that have been
/// announced by the upstream but not yet committed to the cache.
use std::fmt;

pub type Epoch = u64;

/// Sentinel denoting "unset" for a subscription cursor.
pub const EPOCH_NIL: Epoch = u64::MAX;

/// Default gap beyond which the cached prefix is considered decayed and
/// must be flushed rather than caught up incrementally.
pub const DECAY_THRESHOLD: u64 = 20_000;

/// The outstanding fetch region `[from, to]`.
///
/// `from <= to + 1` always holds. The window is *unset* when `from == 0`
/// and `to < from`; *empty* (but set) when `size() == 0` with `from > 0`;
/// *nonempty* otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochWindow {
    from: Epoch,
    to: Epoch,
    decay_threshold: u64,
}

impl fmt::Display for EpochWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EpochWindow{{from: {}, to: {}}}", self.from, self.to)
    }
}

impl EpochWindow {
    /// A window that has never been set (mirrors `from=0, to=0` pre-init).
    pub fn new(decay_threshold: u64) -> Self {
        Self {
            from: 0,
            to: 0,
            decay_threshold,
        }
    }

    pub fn from(&self) -> Epoch {
        self.from
    }

    pub fn to(&self) -> Epoch {
        self.to
    }

    /// Window has been initialized at least once (startup sets it to
    /// `(max+1, max)` even when the cache is empty downstream of genesis).
    pub fn is_set(&self) -> bool {
        self.from > 0 || self.to > 0 || self.from == self.to + 1
    }

    /// Size of the outstanding region. Zero both pre-init and when set but
    /// empty (`from == to + 1`).
    pub fn size(&self) -> u64 {
        if self.from > self.to {
            0
        } else {
            self.to - self.from + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Directly set `(from, to)`. Used on startup and on reorg/flush.
    pub fn reset(&mut self, from: Epoch, to: Epoch) {
        self.from = from;
        self.to = to;
    }

    /// Extend the window to include `e`. If unset, becomes `(e, e)`;
    /// otherwise sets `to = e`. Callers must have already ruled out
    /// overflow/pivot-switch via `peek_will_overflow`/`peek_will_pivot_switch`.
    pub fn update_to(&mut self, e: Epoch) {
        if !self.is_set() {
            self.from = e;
            self.to = e;
        } else {
            self.to = e;
        }
    }

    /// True iff the upstream has raced so far ahead of `from` that
    /// incremental catch-up is no longer reasonable.
    pub fn peek_will_overflow(&self, e: Epoch) -> bool {
        if e < self.from {
            return false;
        }
        e - self.from >= self.decay_threshold
    }

    /// True iff `e` lands at or below the current window, i.e. the
    /// upstream re-announced an already-announced (or already-committed)
    /// epoch — a pivot switch touching the prefix.
    pub fn peek_will_pivot_switch(&self, e: Epoch) -> bool {
        (self.from <= e && e <= self.to) || e < self.from
    }

    /// Next fetch batch without mutating: `(from, min(max, size))`.
    pub fn peek_shrink_from(&self, max: u64) -> (Epoch, u64) {
        (self.from, self.size().min(max))
    }

    /// Commit `n` epochs: advance `from` by `n`. Returns the new `(from, remaining size)`.
    pub fn shrink_from(&mut self, n: u64) -> (Epoch, u64) {
        self.from += n;
        (self.from, self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn win() -> EpochWindow {
        EpochWindow::new(DECAY_THRESHOLD)
    }

    #[test]
    fn unset_window_is_empty() {
        let w = win();
        assert!(w.is_empty());
        assert_eq!(w.size(), 0);
    }

    #[test]
    fn update_to_from_unset_becomes_single_epoch() {
        let mut w = win();
        w.update_to(100);
        assert_eq!((w.from(), w.to()), (100, 100));
        assert_eq!(w.size(), 1);
    }

    #[test]
    fn update_to_extends_existing_window() {
        let mut w = win();
        w.update_to(100);
        w.update_to(105);
        assert_eq!((w.from(), w.to()), (100, 105));
        assert_eq!(w.size(), 6);
    }

    #[test]
    fn peek_will_overflow_true_past_threshold() {
        let mut w = win();
        w.reset(50_001, 50_000);
        assert!(w.peek_will_overflow(80_000));
        assert!(!w.peek_will_overflow(60_000));
    }

    #[test]
    fn peek_will_overflow_false_when_e_below_from() {
        let mut w = win();
        w.reset(100, 99);
        assert!(!w.peek_will_overflow(50));
    }

    #[test]
    fn peek_will_pivot_switch_within_or_below_window() {
        let mut w = win();
        w.reset(100, 110);
        assert!(w.peek_will_pivot_switch(105));
        assert!(w.peek_will_pivot_switch(100));
        assert!(w.peek_will_pivot_switch(110));
        assert!(w.peek_will_pivot_switch(50));
        assert!(!w.peek_will_pivot_switch(111));
    }

    #[test]
    fn peek_shrink_from_caps_at_max_batch() {
        let mut w = win();
        w.reset(100, 200);
        assert_eq!(w.peek_shrink_from(10), (100, 10));
        assert_eq!(w.peek_shrink_from(1000), (100, 101));
    }

    #[test]
    fn shrink_from_advances_window() {
        let mut w = win();
        w.reset(100, 200);
        let (from, remaining) = w.shrink_from(50);
        assert_eq!(from, 150);
        assert_eq!(remaining, 51);
    }

    #[test]
    fn reset_to_revert_point_makes_single_epoch_window() {
        let mut w = win();
        w.reset(100, 110);
        w.reset(108, 108);
        assert_eq!((w.from(), w.to()), (108, 108));
        assert_eq!(w.size(), 1);
    }
}
