// Engine timer queue — scheduled transitions, never blocking waits.
//
// A min-heap of `(at_ms, sequence)`-ordered timers, popped by
// `Session::advance` as the host-supplied clock passes them. The victory
// sequence is the only client today: banner end and the automatic world
// reset are two separately scheduled timers, so the single-threaded event
// loop never sleeps.
//
// Timers are *not* persisted: the save record predates any pending victory
// phase (the save is deleted during the reset anyway), and host wall-clock
// times would be meaningless across sessions.
//
// See also: `session.rs` for scheduling and for the explicit-reset path
// that clears pending timers before they can double-fire.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// What should happen when a timer fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// The victory acknowledgment has been shown long enough.
    VictoryBannerEnd,
    /// Perform the automatic post-victory world reset.
    VictoryReset,
}

/// A timer scheduled for a future engine clock value.
#[derive(Clone, Copy, Debug)]
pub struct Timer {
    /// Engine clock (host milliseconds) at which this timer fires.
    pub at_ms: u64,
    /// Monotonic tiebreaker: timers scheduled earlier fire earlier within
    /// the same millisecond.
    pub sequence: u64,
    pub kind: TimerKind,
}

// We want a min-heap: lowest (at_ms, sequence) fires first. Rust's
// BinaryHeap is a max-heap, so the ordering is reversed.
impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.at_ms == other.at_ms && self.sequence == other.sequence
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at_ms
            .cmp(&self.at_ms)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority queue of pending timers.
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Timer>,
    next_sequence: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a timer at the given engine clock value.
    pub fn schedule(&mut self, at_ms: u64, kind: TimerKind) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Timer {
            at_ms,
            sequence,
            kind,
        });
    }

    /// Pop the next timer if it is due at or before `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<Timer> {
        if self.heap.peek().is_some_and(|t| t.at_ms <= now_ms) {
            self.heap.pop()
        } else {
            None
        }
    }

    /// Cancel everything pending. Used by an explicit reset to pre-empt the
    /// timer-driven one.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
