// Movement sources — pluggable suppliers of proposed player positions.
//
// A closed set of two variants behind one start/stop/poll capability:
//
// - `StepSource`: consumes discrete directional events and proposes
//   exactly one position per event, offset from the engine's current
//   player position by one cell size on that axis.
// - `TrackingSource`: wraps an external `PositionFeed` (geolocation or
//   any other continuous supplier) and relays every fix it receives,
//   **unsnapped** — snapping to cell centers is the engine's job, not the
//   source's.
//
// Exactly one variant is active at a time; `session.rs` stops the old one
// fully before starting the new one, and tracks the active mode explicitly
// (it is part of the persisted record). The variant is never recovered by
// runtime type inspection — match on the enum.
//
// Stop contract: `stop()` is idempotent, releases the feed subscription,
// and guarantees that no position is emitted after it returns — queued
// step events are discarded and a stopped tracking source never polls its
// feed again.

use crate::types::{GeoPos, MovementMode};
use std::collections::VecDeque;
use thiserror::Error;

/// Non-fatal movement failures. The engine logs these and keeps the last
/// known position; they never corrupt session state.
#[derive(Debug, Error)]
pub enum MovementError {
    /// The continuous position feed cannot deliver fixes (no capability,
    /// permission denied, timeout, …).
    #[error("position feed unavailable: {0}")]
    FeedUnavailable(String),
}

/// External supplier of continuous position fixes.
///
/// Implementations wrap whatever the platform offers (browser geolocation,
/// a GPS daemon, a replay file). The engine polls from its single event
/// context; implementations must not assume they are polled at any
/// particular rate.
pub trait PositionFeed {
    /// Begin delivering fixes. Failing here is non-fatal to the session.
    fn subscribe(&mut self) -> Result<(), MovementError>;

    /// Release the subscription. Must be safe to call repeatedly.
    fn unsubscribe(&mut self);

    /// Next pending fix, if any.
    fn poll_fix(&mut self) -> Option<GeoPos>;
}

/// A discrete directional step event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepDirection {
    North,
    South,
    East,
    West,
}

// ---------------------------------------------------------------------------
// Discrete-step variant
// ---------------------------------------------------------------------------

/// Proposes one position per queued directional event, one cell away from
/// the player's current position.
#[derive(Debug, Default)]
pub struct StepSource {
    pending: VecDeque<StepDirection>,
    running: bool,
}

impl StepSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a directional event. Ignored while stopped, so a stopped
    /// source can never emit a tardy proposal once restarted.
    pub fn push(&mut self, direction: StepDirection) {
        if self.running {
            self.pending.push_back(direction);
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.pending.clear();
    }

    /// Propose the next position: `current` offset by one cell size along
    /// the axis of the oldest queued event.
    pub fn poll(&mut self, current: GeoPos, cell_size: f64) -> Option<GeoPos> {
        if !self.running {
            return None;
        }
        let direction = self.pending.pop_front()?;
        Some(match direction {
            StepDirection::North => GeoPos::new(current.lat + cell_size, current.lng),
            StepDirection::South => GeoPos::new(current.lat - cell_size, current.lng),
            StepDirection::East => GeoPos::new(current.lat, current.lng + cell_size),
            StepDirection::West => GeoPos::new(current.lat, current.lng - cell_size),
        })
    }
}

// ---------------------------------------------------------------------------
// Continuous-tracking variant
// ---------------------------------------------------------------------------

/// Relays fixes from an external feed while running.
pub struct TrackingSource {
    feed: Box<dyn PositionFeed>,
    running: bool,
}

impl std::fmt::Debug for TrackingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingSource")
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl TrackingSource {
    pub fn new(feed: Box<dyn PositionFeed>) -> Self {
        Self {
            feed,
            running: false,
        }
    }

    /// Subscribe to the feed. On failure the source stays stopped and the
    /// error is returned for the caller to surface; the session itself
    /// remains playable.
    pub fn start(&mut self) -> Result<(), MovementError> {
        if self.running {
            return Ok(());
        }
        self.feed.subscribe()?;
        self.running = true;
        Ok(())
    }

    /// Release the subscription. Idempotent; no fix is delivered after
    /// this returns.
    pub fn stop(&mut self) {
        if self.running {
            self.feed.unsubscribe();
            self.running = false;
        }
    }

    /// Next fix from the feed, unsnapped. `None` while stopped.
    pub fn poll(&mut self) -> Option<GeoPos> {
        if !self.running {
            return None;
        }
        self.feed.poll_fix()
    }

    /// Stop and hand the feed back, for parking while another variant is
    /// active.
    pub fn into_feed(mut self) -> Box<dyn PositionFeed> {
        self.stop();
        self.feed
    }
}

// ---------------------------------------------------------------------------
// The closed variant set
// ---------------------------------------------------------------------------

/// The active movement source. One of these exists per session.
#[derive(Debug)]
pub enum MovementSource {
    Step(StepSource),
    Tracking(TrackingSource),
}

impl MovementSource {
    pub fn mode(&self) -> MovementMode {
        match self {
            Self::Step(_) => MovementMode::Step,
            Self::Tracking(_) => MovementMode::Tracking,
        }
    }

    pub fn start(&mut self) -> Result<(), MovementError> {
        match self {
            Self::Step(s) => {
                s.start();
                Ok(())
            }
            Self::Tracking(t) => t.start(),
        }
    }

    pub fn stop(&mut self) {
        match self {
            Self::Step(s) => s.stop(),
            Self::Tracking(t) => t.stop(),
        }
    }

    /// Next proposed position, if the active variant has one.
    pub fn poll(&mut self, current: GeoPos, cell_size: f64) -> Option<GeoPos> {
        match self {
            Self::Step(s) => s.poll(current, cell_size),
            Self::Tracking(t) => t.poll(),
        }
    }
}
