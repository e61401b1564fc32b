// The running game session — single owner of all mutable state.
//
// `Session` owns the override store, the player state, the active movement
// source, the timer queue, and the collaborator handles (save slot,
// position feed, starting-position provider). It is constructed once at
// startup — restoring from the save slot when a valid record exists — and
// its state is replaced wholesale on reset, never resurrected piecemeal.
// There are no ambient globals.
//
// ## Activation
//
// `activate` is the interaction state machine. Check order is significant:
// the frozen gate and the distance gate come first and never mutate;
// pickup and merge are mutually exclusive by construction (pickup requires
// an empty hand, merge a matching one), so their relative order is free.
// Every mutating branch ends by snapshotting the whole session to the save
// slot; a failed write is logged and forgotten — in-memory state stays
// authoritative and playable (§ error taxonomy in `save.rs`/`movement.rs`).
//
// ## Movement
//
// The host forwards directional input through `push_step` and pumps the
// active source with `pump_movement`. Every accepted proposal is snapped
// to a cell center; the near-cell interaction set is a pure function of
// the player position (`near_cells`), so "refreshing" it is just reading
// it after a move. Switching variants stops the old source completely
// before the new one starts; the inactive tracking feed is parked on the
// session so no subscription outlives its variant.
//
// ## Victory
//
// A merge reaching the victory threshold freezes input, emits `Victory`,
// and schedules the two-phase acknowledgment: banner end, then the
// automatic world reset. Both phases are timers popped by `advance` —
// nothing blocks. An explicit `new_game` during the frozen phase clears
// the pending timers first, so the scheduled reset cannot fire twice.
//
// **Critical constraint: determinism.** All mutation flows through
// activation, movement proposals, and timer pops. The only wall-clock the
// engine sees is the host-supplied `advance(now_ms)` value.

use crate::config::GameConfig;
use crate::event::EngineEvent;
use crate::grid::Grid;
use crate::movement::{
    MovementError, MovementSource, PositionFeed, StepDirection, StepSource, TrackingSource,
};
use crate::save::{self, SaveSlot, Snapshot};
use crate::spawn::Spawner;
use crate::store::SpiritStore;
use crate::timer::{TimerKind, TimerQueue};
use crate::types::{CellIndex, GeoBounds, GeoPos, MovementMode};
use crate::view::{self, CellView};
use smallvec::SmallVec;
use std::mem;

/// Best-effort supplier of the starting position.
///
/// Implementations wrap the platform's one-shot position lookup, including
/// any timeout policy. On error the engine falls back to the configured
/// default origin rather than blocking.
pub trait StartPositionProvider {
    fn acquire(&mut self) -> Result<GeoPos, MovementError>;
}

/// Provider that always yields a fixed position. The degenerate case, and
/// all a host needs when it has no positioning capability.
#[derive(Clone, Copy, Debug)]
pub struct FixedStart(pub GeoPos);

impl StartPositionProvider for FixedStart {
    fn acquire(&mut self) -> Result<GeoPos, MovementError> {
        Ok(self.0)
    }
}

/// The external collaborators a session is wired to at construction.
pub struct Collaborators {
    pub slot: Box<dyn SaveSlot>,
    pub feed: Box<dyn PositionFeed>,
    pub start: Box<dyn StartPositionProvider>,
}

/// The result of one activation attempt. Rejections carry no mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The cell's spirit is now in hand; the cell is emptied.
    Pickup { value: u32 },
    /// The held spirit merged into the cell. `value` is the doubled cell
    /// value; `victory` is set when it reached the victory threshold.
    Merge { value: u32, victory: bool },
    /// The held spirit was placed on the empty cell.
    Drop { value: u32 },
    RejectTooFar,
    RejectEmpty,
    RejectMismatch,
    /// Input is frozen during the victory sequence.
    RejectFrozen,
}

impl Outcome {
    /// Whether this outcome mutated session state.
    pub fn mutated(&self) -> bool {
        matches!(self, Self::Pickup { .. } | Self::Merge { .. } | Self::Drop { .. })
    }

    /// User-visible feedback line for the host to display.
    pub fn feedback(&self) -> &'static str {
        match self {
            Self::Pickup { .. } => "You cradle the spirit.",
            Self::Merge { .. } => "The spirits merge and grow.",
            Self::Drop { .. } => "You set the spirit down.",
            Self::RejectTooFar => "Too far to reach.",
            Self::RejectEmpty => "Nothing stirs here.",
            Self::RejectMismatch => "The spirits refuse to merge.",
            Self::RejectFrozen => "The dream is resetting.",
        }
    }
}

/// A running game session. See the module header for the ownership model.
pub struct Session {
    config: GameConfig,
    grid: Grid,
    store: SpiritStore,
    player: GeoPos,
    held: Option<u32>,
    source: MovementSource,
    /// The tracking feed while the step variant is active. Invariant: this
    /// is `Some` exactly when `source` is the step variant.
    parked_feed: Option<Box<dyn PositionFeed>>,
    slot: Box<dyn SaveSlot>,
    start: Box<dyn StartPositionProvider>,
    timers: TimerQueue,
    /// Engine clock, monotonic, fed by `advance`.
    clock_ms: u64,
    frozen: bool,
    events: Vec<EngineEvent>,
}

impl Session {
    /// Start a session: restore from the save slot when it holds a valid
    /// record, otherwise begin fresh at the provider's position (or the
    /// configured origin when the provider is unavailable).
    ///
    /// Any persistence read failure — missing record, malformed JSON,
    /// schema mismatch — is treated identically to "no save exists".
    pub fn new(config: GameConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            mut slot,
            feed,
            mut start,
        } = collaborators;

        let grid = Grid::new(config.cell_size_deg, config.near_radius_cells);
        let mut store = SpiritStore::new(Spawner::new(config.world_seed, config.spawn.clone()));

        let restored = slot.read().and_then(|record| match save::decode(&record) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                log::warn!("ignoring unreadable save record, starting fresh: {err}");
                None
            }
        });
        let fresh = restored.is_none();

        let (player, held, mode) = match restored {
            Some(snapshot) => {
                store.load(snapshot.overrides);
                (
                    grid.snap_to_center(snapshot.player),
                    snapshot.held,
                    snapshot.mode,
                )
            }
            None => {
                let pos = acquire_start(start.as_mut(), &config);
                (grid.snap_to_center(pos), None, MovementMode::default())
            }
        };

        let (source, parked_feed) = match mode {
            MovementMode::Step => {
                let mut step = StepSource::new();
                step.start();
                (MovementSource::Step(step), Some(feed))
            }
            MovementMode::Tracking => {
                let mut tracking = TrackingSource::new(feed);
                if let Err(err) = tracking.start() {
                    log::warn!("position feed unavailable at startup: {err}");
                }
                (MovementSource::Tracking(tracking), None)
            }
        };

        let mut session = Self {
            config,
            grid,
            store,
            player,
            held,
            source,
            parked_feed,
            slot,
            start,
            timers: TimerQueue::new(),
            clock_ms: 0,
            frozen: false,
            events: Vec::new(),
        };

        // A fresh session writes its first record immediately, so a crash
        // before the first action restores the same starting position.
        if fresh {
            session.persist();
        }
        session
    }

    // -----------------------------------------------------------------------
    // Activation
    // -----------------------------------------------------------------------

    /// Attempt to interact with a cell. The state machine of the game.
    pub fn activate(&mut self, index: CellIndex) -> Outcome {
        if self.frozen {
            return Outcome::RejectFrozen;
        }
        // The distance gate always runs before any value is resolved.
        if !self.grid.is_near(self.player, index) {
            return Outcome::RejectTooFar;
        }

        let value = self.store.get(index);
        match self.held {
            None if value > 0 => {
                self.store.set(index, 0);
                self.held = Some(value);
                self.events.push(EngineEvent::SpiritPicked { index, value });
                self.persist();
                Outcome::Pickup { value }
            }
            // Held spirits are always positive, so equality implies a
            // non-empty cell.
            Some(held) if value == held => {
                let merged = value.saturating_mul(2);
                self.store.set(index, merged);
                self.held = None;
                self.events
                    .push(EngineEvent::SpiritMerged { index, value: merged });
                let victory = merged >= self.config.victory_threshold;
                if victory {
                    self.begin_victory(merged);
                }
                self.persist();
                Outcome::Merge {
                    value: merged,
                    victory,
                }
            }
            Some(held) if value == 0 => {
                self.store.set(index, held);
                self.held = None;
                self.events
                    .push(EngineEvent::SpiritDropped { index, value: held });
                self.persist();
                Outcome::Drop { value: held }
            }
            None => Outcome::RejectEmpty,
            Some(_) => Outcome::RejectMismatch,
        }
    }

    // -----------------------------------------------------------------------
    // Victory sequence
    // -----------------------------------------------------------------------

    fn begin_victory(&mut self, value: u32) {
        self.frozen = true;
        self.events.push(EngineEvent::Victory { value });
        let banner_end = self.clock_ms + self.config.victory_banner_ms;
        self.timers.schedule(banner_end, TimerKind::VictoryBannerEnd);
        self.timers.schedule(
            banner_end + self.config.victory_reset_delay_ms,
            TimerKind::VictoryReset,
        );
    }

    /// Advance the engine clock and fire any due timers. The host calls
    /// this from its event loop with a monotonic millisecond value.
    pub fn advance(&mut self, now_ms: u64) {
        if now_ms > self.clock_ms {
            self.clock_ms = now_ms;
        }
        while let Some(timer) = self.timers.pop_due(self.clock_ms) {
            match timer.kind {
                TimerKind::VictoryBannerEnd => self.events.push(EngineEvent::VictoryBannerEnded),
                TimerKind::VictoryReset => self.reset_world(),
            }
        }
    }

    /// Start over: clear every override, the held spirit, and the save;
    /// re-acquire a starting position; re-enable input.
    ///
    /// Safe to call at any time, including during the frozen victory
    /// phase — pending victory timers are cancelled first, so the
    /// scheduled reset cannot fire a second time.
    pub fn new_game(&mut self) {
        self.reset_world();
    }

    fn reset_world(&mut self) {
        self.timers.clear();
        self.frozen = false;
        self.store.clear();
        self.held = None;
        self.slot.delete();
        let pos = acquire_start(self.start.as_mut(), &self.config);
        self.player = self.grid.snap_to_center(pos);
        self.events.push(EngineEvent::WorldReset);
        self.persist();
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    /// Queue a directional step. Ignored while the tracking variant is
    /// active — directional input has no meaning there.
    pub fn push_step(&mut self, direction: StepDirection) {
        if let MovementSource::Step(step) = &mut self.source {
            step.push(direction);
        }
    }

    /// Drain the active movement source and apply its proposals. Returns
    /// the player's position after the last accepted proposal, if any
    /// proposal was accepted.
    ///
    /// While input is frozen, proposals are still drained but discarded,
    /// so a stale burst cannot land right after the reset.
    pub fn pump_movement(&mut self) -> Option<GeoPos> {
        let cell_size = self.grid.cell_size();
        let mut last = None;
        while let Some(proposal) = self.source.poll(self.player, cell_size) {
            if self.frozen {
                continue;
            }
            if let Some(accepted) = self.propose_position(proposal) {
                last = Some(accepted);
            }
        }
        last
    }

    /// The single entry point for proposed player positions, from whichever
    /// movement source is active (or the host directly). The proposal is
    /// snapped to its cell center; a move to a new cell updates the player
    /// and snapshots the session.
    ///
    /// Returns the snapped position when the proposal was accepted (even
    /// if it landed in the current cell), `None` when rejected.
    pub fn propose_position(&mut self, pos: GeoPos) -> Option<GeoPos> {
        if self.frozen {
            return None;
        }
        if !pos.is_finite() {
            log::debug!("discarding non-finite position proposal");
            return None;
        }
        let snapped = self.grid.snap_to_center(pos);
        if snapped != self.player {
            self.player = snapped;
            self.events
                .push(EngineEvent::PlayerMoved { position: snapped });
            self.persist();
        }
        Some(snapped)
    }

    /// Switch the active movement variant. The old source is stopped
    /// completely — subscription released, queued events discarded — before
    /// the new one starts.
    ///
    /// A feed that cannot subscribe is non-fatal: the mode still switches,
    /// the error is returned for the host to surface, and the player keeps
    /// their last known position.
    pub fn set_movement_mode(&mut self, mode: MovementMode) -> Result<(), MovementError> {
        if mode == self.source.mode() {
            return Ok(());
        }
        self.source.stop();
        let result = match mode {
            MovementMode::Step => {
                let old = mem::replace(&mut self.source, MovementSource::Step(StepSource::new()));
                if let MovementSource::Tracking(tracking) = old {
                    self.parked_feed = Some(tracking.into_feed());
                }
                self.source.start()
            }
            MovementMode::Tracking => match self.parked_feed.take() {
                Some(feed) => {
                    self.source = MovementSource::Tracking(TrackingSource::new(feed));
                    let started = self.source.start();
                    if let Err(err) = &started {
                        log::warn!("position feed unavailable, tracking stays silent: {err}");
                    }
                    started
                }
                // Unreachable while the parked-feed invariant holds; kept
                // as a graceful failure instead of a panic.
                None => Err(MovementError::FeedUnavailable(
                    "no position feed attached".to_owned(),
                )),
            },
        };
        self.persist();
        result
    }

    // -----------------------------------------------------------------------
    // Views & accessors
    // -----------------------------------------------------------------------

    /// Renderer contract: every cell covering the viewport, with bounds,
    /// effective value, and proximity flag.
    pub fn visible_cells(&self, viewport: GeoBounds) -> Vec<CellView> {
        view::visible_cells(&self.grid, &self.store, self.player, viewport)
    }

    /// The current interaction set: cells within activation reach.
    pub fn near_cells(&self) -> SmallVec<[CellIndex; 36]> {
        view::near_cells(&self.grid, self.player)
    }

    /// Effective value of a cell (override or spawn value).
    pub fn cell_value(&self, index: CellIndex) -> u32 {
        self.store.get(index)
    }

    pub fn player(&self) -> GeoPos {
        self.player
    }

    pub fn held(&self) -> Option<u32> {
        self.held
    }

    pub fn movement_mode(&self) -> MovementMode {
        self.source.mode()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Drain the events emitted since the last call, in order.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        mem::take(&mut self.events)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Snapshot the whole session to the save slot. Best-effort: a failed
    /// write is logged and the in-memory state stays authoritative.
    fn persist(&mut self) {
        let snapshot = Snapshot {
            player: self.player,
            held: self.held,
            overrides: self.store.entries(),
            mode: self.source.mode(),
        };
        match save::encode(&snapshot) {
            Ok(record) => {
                if let Err(err) = self.slot.write(&record) {
                    log::warn!("save write failed, playing on without durability: {err}");
                }
            }
            Err(err) => log::warn!("save encode failed, playing on without durability: {err}"),
        }
    }
}

fn acquire_start(provider: &mut dyn StartPositionProvider, config: &GameConfig) -> GeoPos {
    match provider.acquire() {
        Ok(pos) if pos.is_finite() => pos,
        Ok(pos) => {
            log::warn!("discarding non-finite start position {pos}, using default origin");
            config.default_origin
        }
        Err(err) => {
            log::warn!("start position unavailable ({err}), using default origin");
            config.default_origin
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    // -- test collaborators --------------------------------------------------

    #[derive(Debug, Default)]
    struct SlotState {
        record: Option<String>,
        fail_writes: bool,
        writes: usize,
        deletes: usize,
    }

    #[derive(Clone, Default)]
    struct SharedSlot(Rc<RefCell<SlotState>>);

    impl SaveSlot for SharedSlot {
        fn read(&mut self) -> Option<String> {
            self.0.borrow().record.clone()
        }

        fn write(&mut self, record: &str) -> Result<(), crate::save::SlotError> {
            let mut state = self.0.borrow_mut();
            state.writes += 1;
            if state.fail_writes {
                return Err(crate::save::SlotError {
                    reason: "storage full".to_owned(),
                });
            }
            state.record = Some(record.to_owned());
            Ok(())
        }

        fn delete(&mut self) {
            let mut state = self.0.borrow_mut();
            state.deletes += 1;
            state.record = None;
        }
    }

    #[derive(Debug, Default)]
    struct FeedState {
        fixes: VecDeque<GeoPos>,
        fail_subscribe: bool,
        subscribes: usize,
        unsubscribes: usize,
    }

    #[derive(Clone, Default)]
    struct SharedFeed(Rc<RefCell<FeedState>>);

    impl PositionFeed for SharedFeed {
        fn subscribe(&mut self) -> Result<(), MovementError> {
            let mut state = self.0.borrow_mut();
            if state.fail_subscribe {
                return Err(MovementError::FeedUnavailable("denied".to_owned()));
            }
            state.subscribes += 1;
            Ok(())
        }

        fn unsubscribe(&mut self) {
            self.0.borrow_mut().unsubscribes += 1;
        }

        fn poll_fix(&mut self) -> Option<GeoPos> {
            self.0.borrow_mut().fixes.pop_front()
        }
    }

    // -- fixtures ------------------------------------------------------------

    /// Unit-size cells keep all positions exactly representable.
    fn test_config() -> GameConfig {
        GameConfig {
            cell_size_deg: 1.0,
            near_radius_cells: 2.5,
            victory_threshold: 64,
            victory_banner_ms: 4000,
            victory_reset_delay_ms: 1500,
            ..GameConfig::default()
        }
    }

    struct Rig {
        session: Session,
        slot: Rc<RefCell<SlotState>>,
        feed: Rc<RefCell<FeedState>>,
    }

    fn rig_at(config: GameConfig, start: GeoPos) -> Rig {
        let slot = Rc::new(RefCell::new(SlotState::default()));
        let feed = Rc::new(RefCell::new(FeedState::default()));
        let session = Session::new(
            config,
            Collaborators {
                slot: Box::new(SharedSlot(Rc::clone(&slot))),
                feed: Box::new(SharedFeed(Rc::clone(&feed))),
                start: Box::new(FixedStart(start)),
            },
        );
        Rig {
            session,
            slot,
            feed,
        }
    }

    fn spawner(config: &GameConfig) -> Spawner {
        Spawner::new(config.world_seed, config.spawn.clone())
    }

    /// Find a cell whose spawn value is `want`, scanning out from the
    /// origin. Deterministic for a fixed config.
    fn find_cell_with_value(config: &GameConfig, want: u32) -> CellIndex {
        let s = spawner(config);
        (0i64..100_000)
            .map(|n| CellIndex::new(n / 300 - 150, n % 300 - 150))
            .find(|&idx| s.spirit_at(idx) == want)
            .expect("value not found in scan region")
    }

    /// Find a cell with spawn value `want` whose eastern neighbor spawns
    /// empty — a pickup target with a guaranteed drop site next door.
    fn find_cell_with_empty_neighbor(config: &GameConfig, want: u32) -> (CellIndex, CellIndex) {
        let s = spawner(config);
        (0i64..100_000)
            .map(|n| CellIndex::new(n / 300 - 150, n % 300 - 150))
            .find_map(|idx| {
                let neighbor = CellIndex::new(idx.i, idx.j + 1);
                (s.spirit_at(idx) == want && s.spirit_at(neighbor) == 0)
                    .then_some((idx, neighbor))
            })
            .expect("pattern not found in scan region")
    }

    // -- activation scenarios ------------------------------------------------

    #[test]
    fn pickup_from_procedural_cell() {
        let config = test_config();
        let target = find_cell_with_value(&config, 1);
        let grid = Grid::new(config.cell_size_deg, config.near_radius_cells);
        let mut rig = rig_at(config, grid.cell_center(target));

        let outcome = rig.session.activate(target);
        assert_eq!(outcome, Outcome::Pickup { value: 1 });
        assert_eq!(rig.session.held(), Some(1));
        assert_eq!(rig.session.cell_value(target), 0);
        let events = rig.session.take_events();
        assert!(events.contains(&EngineEvent::SpiritPicked {
            index: target,
            value: 1
        }));
    }

    #[test]
    fn emptied_cell_rejects_a_second_pickup() {
        let config = test_config();
        let target = find_cell_with_value(&config, 2);
        let grid = Grid::new(config.cell_size_deg, config.near_radius_cells);
        let mut rig = rig_at(config, grid.cell_center(target));

        assert_eq!(rig.session.activate(target), Outcome::Pickup { value: 2 });
        // Drop elsewhere is not needed: an empty hand on the emptied cell.
        rig.session.held = None;
        assert_eq!(rig.session.activate(target), Outcome::RejectEmpty);
    }

    #[test]
    fn merge_doubles_and_empties_the_hand() {
        let config = test_config();
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));
        let target = CellIndex::new(0, 1);
        rig.session.store.set(target, 2);
        rig.session.held = Some(2);

        let outcome = rig.session.activate(target);
        assert_eq!(
            outcome,
            Outcome::Merge {
                value: 4,
                victory: false
            }
        );
        assert_eq!(rig.session.cell_value(target), 4);
        assert_eq!(rig.session.held(), None);
    }

    #[test]
    fn mismatch_rejects_without_mutation() {
        let config = test_config();
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));
        let target = CellIndex::new(1, 0);
        rig.session.store.set(target, 4);
        rig.session.held = Some(1);
        let writes_before = rig.slot.borrow().writes;

        assert_eq!(rig.session.activate(target), Outcome::RejectMismatch);
        assert_eq!(rig.session.held(), Some(1));
        assert_eq!(rig.session.cell_value(target), 4);
        // No mutation, no snapshot.
        assert_eq!(rig.slot.borrow().writes, writes_before);
    }

    #[test]
    fn too_far_rejects_regardless_of_values() {
        let config = test_config();
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));
        let far = CellIndex::new(10, 10);
        rig.session.store.set(far, 2);
        rig.session.held = Some(2);
        let writes_before = rig.slot.borrow().writes;

        assert_eq!(rig.session.activate(far), Outcome::RejectTooFar);
        assert_eq!(rig.session.held(), Some(2));
        assert_eq!(rig.session.cell_value(far), 2);
        assert_eq!(rig.slot.borrow().writes, writes_before);
    }

    #[test]
    fn empty_cell_empty_hand_rejects() {
        let config = test_config();
        let (_, empty) = find_cell_with_empty_neighbor(&config, 1);
        let grid = Grid::new(config.cell_size_deg, config.near_radius_cells);
        let mut rig = rig_at(config, grid.cell_center(empty));

        assert_eq!(rig.session.activate(empty), Outcome::RejectEmpty);
    }

    #[test]
    fn drop_places_held_spirit_on_empty_cell() {
        let config = test_config();
        let (target, empty) = find_cell_with_empty_neighbor(&config, 1);
        let grid = Grid::new(config.cell_size_deg, config.near_radius_cells);
        let mut rig = rig_at(config, grid.cell_center(target));

        assert_eq!(rig.session.activate(target), Outcome::Pickup { value: 1 });
        assert_eq!(rig.session.activate(empty), Outcome::Drop { value: 1 });
        assert_eq!(rig.session.held(), None);
        assert_eq!(rig.session.cell_value(empty), 1);
    }

    #[test]
    fn dropped_cell_is_an_ordinary_positive_cell() {
        let config = test_config();
        let (target, empty) = find_cell_with_empty_neighbor(&config, 1);
        let grid = Grid::new(config.cell_size_deg, config.near_radius_cells);
        let mut rig = rig_at(config, grid.cell_center(target));

        rig.session.activate(target);
        rig.session.activate(empty);
        // Pick it back up…
        assert_eq!(rig.session.activate(empty), Outcome::Pickup { value: 1 });
        // …and it merges like any other cell.
        rig.session.store.set(target, 1);
        assert_eq!(
            rig.session.activate(target),
            Outcome::Merge {
                value: 2,
                victory: false
            }
        );
    }

    #[test]
    fn held_spirit_never_accumulates() {
        let config = test_config();
        let target = find_cell_with_value(&config, 1);
        let grid = Grid::new(config.cell_size_deg, config.near_radius_cells);
        let mut rig = rig_at(config, grid.cell_center(target));
        let other = CellIndex::new(target.i, target.j + 1);
        rig.session.store.set(other, 4);

        assert_eq!(rig.session.activate(target), Outcome::Pickup { value: 1 });
        // A second positive cell cannot be picked up or merged.
        assert_eq!(rig.session.activate(other), Outcome::RejectMismatch);
        assert_eq!(rig.session.held(), Some(1));
    }

    #[test]
    fn farming_exploit_is_closed() {
        let config = test_config();
        let target = find_cell_with_value(&config, 2);
        let grid = Grid::new(config.cell_size_deg, config.near_radius_cells);
        let mut rig = rig_at(config.clone(), grid.cell_center(target));

        assert_eq!(rig.session.activate(target), Outcome::Pickup { value: 2 });

        // Wander far away and back without merging or dropping.
        let far = GeoPos::new(
            target.i as f64 + 500.5,
            target.j as f64 + 500.5,
        );
        rig.session.propose_position(far);
        rig.session.propose_position(grid.cell_center(target));

        // Still emptied — not regenerated from the spawn table.
        assert_eq!(rig.session.cell_value(target), 0);
        assert!(rig.session.store.is_overridden(target));
    }

    // -- victory sequence ----------------------------------------------------

    fn victory_rig() -> Rig {
        let config = GameConfig {
            victory_threshold: 4,
            ..test_config()
        };
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));
        let target = CellIndex::new(0, 1);
        rig.session.store.set(target, 2);
        rig.session.held = Some(2);
        let outcome = rig.session.activate(target);
        assert_eq!(
            outcome,
            Outcome::Merge {
                value: 4,
                victory: true
            }
        );
        rig
    }

    #[test]
    fn threshold_merge_emits_victory_once_and_freezes_input() {
        let mut rig = victory_rig();
        assert!(rig.session.is_frozen());

        let events = rig.session.take_events();
        let victories = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::Victory { .. }))
            .count();
        assert_eq!(victories, 1);

        // Frozen: no activation, no movement.
        assert_eq!(
            rig.session.activate(CellIndex::new(0, 0)),
            Outcome::RejectFrozen
        );
        rig.session.push_step(StepDirection::North);
        assert_eq!(rig.session.pump_movement(), None);
        assert_eq!(rig.session.player(), GeoPos::new(0.5, 0.5));
    }

    #[test]
    fn victory_reset_fires_after_both_phases() {
        let mut rig = victory_rig();
        rig.session.take_events();

        rig.session.advance(3999);
        assert!(rig.session.take_events().is_empty());
        assert!(rig.session.is_frozen());

        rig.session.advance(4000);
        assert_eq!(
            rig.session.take_events(),
            vec![EngineEvent::VictoryBannerEnded]
        );
        assert!(rig.session.is_frozen(), "still frozen between phases");

        rig.session.advance(5500);
        let events = rig.session.take_events();
        assert!(events.contains(&EngineEvent::WorldReset));
        assert!(!rig.session.is_frozen());
        assert_eq!(rig.session.held(), None);
        assert!(rig.session.store.is_empty());
        assert_eq!(rig.slot.borrow().deletes, 1);
        // The fresh state was re-persisted after the delete.
        assert!(rig.slot.borrow().record.is_some());
    }

    #[test]
    fn explicit_new_game_preempts_victory_timers() {
        let mut rig = victory_rig();
        rig.session.take_events();

        rig.session.new_game();
        let events = rig.session.take_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, EngineEvent::WorldReset))
                .count(),
            1
        );
        assert!(!rig.session.is_frozen());

        // The scheduled reset must not fire a second time.
        rig.session.advance(1_000_000);
        let events = rig.session.take_events();
        assert!(
            !events.contains(&EngineEvent::WorldReset),
            "timer-driven reset double-fired"
        );
    }

    #[test]
    fn frozen_session_discards_tracking_fixes() {
        let mut rig = victory_rig();
        rig.session.take_events();
        rig.session.set_movement_mode(MovementMode::Tracking).unwrap();
        rig.feed
            .borrow_mut()
            .fixes
            .push_back(GeoPos::new(40.2, 40.7));

        assert_eq!(rig.session.pump_movement(), None);
        // The fix was drained, not deferred: after the reset it is gone.
        rig.session.advance(10_000);
        assert_eq!(rig.session.pump_movement(), None);
        assert_eq!(rig.session.player(), GeoPos::new(0.5, 0.5));
    }

    // -- movement ------------------------------------------------------------

    #[test]
    fn step_movement_moves_one_cell_and_persists() {
        let config = test_config();
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));
        let writes_before = rig.slot.borrow().writes;

        rig.session.push_step(StepDirection::North);
        assert_eq!(rig.session.pump_movement(), Some(GeoPos::new(1.5, 0.5)));
        assert_eq!(rig.session.player(), GeoPos::new(1.5, 0.5));
        assert!(rig.slot.borrow().writes > writes_before);

        // The persisted record reflects the move.
        let record = rig.slot.borrow().record.clone().unwrap();
        let snapshot = save::decode(&record).unwrap();
        assert_eq!(snapshot.player, GeoPos::new(1.5, 0.5));
    }

    #[test]
    fn tracking_fixes_are_snapped_to_cell_centers() {
        let config = test_config();
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));
        rig.session.set_movement_mode(MovementMode::Tracking).unwrap();
        rig.feed
            .borrow_mut()
            .fixes
            .push_back(GeoPos::new(0.2, 3.7));

        assert_eq!(rig.session.pump_movement(), Some(GeoPos::new(0.5, 3.5)));
        let events = rig.session.take_events();
        assert!(events.contains(&EngineEvent::PlayerMoved {
            position: GeoPos::new(0.5, 3.5)
        }));
    }

    #[test]
    fn non_finite_fix_is_rejected() {
        let config = test_config();
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));
        rig.session.set_movement_mode(MovementMode::Tracking).unwrap();
        rig.feed
            .borrow_mut()
            .fixes
            .push_back(GeoPos::new(f64::NAN, 0.0));

        assert_eq!(rig.session.pump_movement(), None);
        assert_eq!(rig.session.player(), GeoPos::new(0.5, 0.5));
    }

    #[test]
    fn same_cell_fix_accepts_without_snapshot() {
        let config = test_config();
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));
        let writes_before = rig.slot.borrow().writes;

        // A proposal inside the current cell is accepted but changes
        // nothing and writes nothing.
        assert_eq!(
            rig.session.propose_position(GeoPos::new(0.9, 0.1)),
            Some(GeoPos::new(0.5, 0.5))
        );
        assert_eq!(rig.slot.borrow().writes, writes_before);
    }

    #[test]
    fn mode_switch_stops_old_source_before_starting_new() {
        let config = test_config();
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));

        rig.session.set_movement_mode(MovementMode::Tracking).unwrap();
        assert_eq!(rig.session.movement_mode(), MovementMode::Tracking);
        assert_eq!(rig.feed.borrow().subscribes, 1);

        rig.session.set_movement_mode(MovementMode::Step).unwrap();
        assert_eq!(rig.session.movement_mode(), MovementMode::Step);
        assert_eq!(rig.feed.borrow().unsubscribes, 1);

        // A fix left in the feed is not delivered through the step variant.
        rig.feed
            .borrow_mut()
            .fixes
            .push_back(GeoPos::new(9.5, 9.5));
        assert_eq!(rig.session.pump_movement(), None);

        // Step input queued while tracking was active was ignored.
        rig.session.push_step(StepDirection::East);
        assert_eq!(rig.session.pump_movement(), Some(GeoPos::new(0.5, 1.5)));
    }

    #[test]
    fn mode_switch_is_idempotent() {
        let config = test_config();
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));
        rig.session.set_movement_mode(MovementMode::Tracking).unwrap();
        rig.session.set_movement_mode(MovementMode::Tracking).unwrap();
        assert_eq!(rig.feed.borrow().subscribes, 1);
    }

    #[test]
    fn unavailable_feed_still_switches_mode_non_fatally() {
        let config = test_config();
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));
        rig.feed.borrow_mut().fail_subscribe = true;

        let result = rig.session.set_movement_mode(MovementMode::Tracking);
        assert!(result.is_err());
        assert_eq!(rig.session.movement_mode(), MovementMode::Tracking);
        // Silent feed: no proposals, player keeps the last known position.
        assert_eq!(rig.session.pump_movement(), None);
        assert_eq!(rig.session.player(), GeoPos::new(0.5, 0.5));
        // The session is still fully playable.
        rig.session.set_movement_mode(MovementMode::Step).unwrap();
        rig.session.push_step(StepDirection::South);
        assert_eq!(rig.session.pump_movement(), Some(GeoPos::new(-0.5, 0.5)));
    }

    // -- persistence ---------------------------------------------------------

    #[test]
    fn fresh_session_persists_its_starting_state() {
        let config = test_config();
        let rig = rig_at(config, GeoPos::new(10.2, -3.9));
        let record = rig.slot.borrow().record.clone().unwrap();
        let snapshot = save::decode(&record).unwrap();
        assert_eq!(snapshot.player, GeoPos::new(10.5, -3.5));
        assert_eq!(snapshot.held, None);
        assert!(snapshot.overrides.is_empty());
        assert_eq!(snapshot.mode, MovementMode::Step);
    }

    #[test]
    fn session_restores_from_the_slot_exactly() {
        let config = test_config();
        let target = find_cell_with_value(&config, 2);
        let grid = Grid::new(config.cell_size_deg, config.near_radius_cells);
        let mut rig = rig_at(config.clone(), grid.cell_center(target));

        rig.session.activate(target);
        rig.session.push_step(StepDirection::East);
        rig.session.pump_movement();
        let expected_player = rig.session.player();

        // A second session over the same slot: same world.
        let slot = Rc::clone(&rig.slot);
        let restored = Session::new(
            config,
            Collaborators {
                slot: Box::new(SharedSlot(slot)),
                feed: Box::new(SharedFeed::default()),
                // The provider must not be consulted when a save exists.
                start: Box::new(FixedStart(GeoPos::new(-80.5, 80.5))),
            },
        );
        assert_eq!(restored.player(), expected_player);
        assert_eq!(restored.held(), Some(2));
        assert_eq!(restored.cell_value(target), 0);
        assert_eq!(restored.movement_mode(), MovementMode::Step);
    }

    #[test]
    fn restored_tracking_mode_resubscribes_at_startup() {
        let config = test_config();
        let mut rig = rig_at(config.clone(), GeoPos::new(0.5, 0.5));
        rig.session.set_movement_mode(MovementMode::Tracking).unwrap();

        let slot = Rc::clone(&rig.slot);
        let feed = Rc::new(RefCell::new(FeedState::default()));
        let restored = Session::new(
            config,
            Collaborators {
                slot: Box::new(SharedSlot(slot)),
                feed: Box::new(SharedFeed(Rc::clone(&feed))),
                start: Box::new(FixedStart(GeoPos::new(0.5, 0.5))),
            },
        );
        assert_eq!(restored.movement_mode(), MovementMode::Tracking);
        assert_eq!(feed.borrow().subscribes, 1);
    }

    #[test]
    fn corrupted_save_starts_fresh() {
        let config = test_config();
        let slot = Rc::new(RefCell::new(SlotState {
            record: Some("{not a save record".to_owned()),
            ..Default::default()
        }));
        let session = Session::new(
            config,
            Collaborators {
                slot: Box::new(SharedSlot(Rc::clone(&slot))),
                feed: Box::new(SharedFeed::default()),
                start: Box::new(FixedStart(GeoPos::new(2.5, 2.5))),
            },
        );
        assert_eq!(session.player(), GeoPos::new(2.5, 2.5));
        assert_eq!(session.held(), None);
        assert!(session.store.is_empty());
    }

    #[test]
    fn write_failure_keeps_session_playable() {
        let config = test_config();
        let target = find_cell_with_value(&config, 1);
        let grid = Grid::new(config.cell_size_deg, config.near_radius_cells);
        let mut rig = rig_at(config, grid.cell_center(target));
        rig.slot.borrow_mut().fail_writes = true;

        // The mutation sticks even though the snapshot was lost.
        assert_eq!(rig.session.activate(target), Outcome::Pickup { value: 1 });
        assert_eq!(rig.session.held(), Some(1));
        assert_eq!(rig.session.cell_value(target), 0);

        // Durability resumes on the next successful write.
        rig.slot.borrow_mut().fail_writes = false;
        rig.session.push_step(StepDirection::West);
        rig.session.pump_movement();
        let record = rig.slot.borrow().record.clone().unwrap();
        let snapshot = save::decode(&record).unwrap();
        assert_eq!(snapshot.held, Some(1));
    }

    // -- start position fallback ---------------------------------------------

    struct FailingStart;

    impl StartPositionProvider for FailingStart {
        fn acquire(&mut self) -> Result<GeoPos, MovementError> {
            Err(MovementError::FeedUnavailable("timeout".to_owned()))
        }
    }

    #[test]
    fn unavailable_provider_falls_back_to_default_origin() {
        let config = GameConfig {
            default_origin: GeoPos::new(12.0, 34.0),
            ..test_config()
        };
        let session = Session::new(
            config,
            Collaborators {
                slot: Box::new(SharedSlot::default()),
                feed: Box::new(SharedFeed::default()),
                start: Box::new(FailingStart),
            },
        );
        assert_eq!(session.player(), GeoPos::new(12.5, 34.5));
    }

    // -- views ---------------------------------------------------------------

    #[test]
    fn visible_cells_expose_session_state_to_the_renderer() {
        let config = test_config();
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));
        rig.session.store.set(CellIndex::new(1, 1), 42);

        let cells = rig.session.visible_cells(GeoBounds {
            south: 0.0,
            west: 0.0,
            north: 1.5,
            east: 1.5,
        });
        let cell = cells
            .iter()
            .find(|c| c.index == CellIndex::new(1, 1))
            .unwrap();
        assert_eq!(cell.value, 42);
        assert!(cell.near);
    }

    #[test]
    fn near_cells_track_the_player() {
        let config = test_config();
        let mut rig = rig_at(config, GeoPos::new(0.5, 0.5));
        assert!(rig.session.near_cells().contains(&CellIndex::new(0, 0)));

        rig.session.propose_position(GeoPos::new(100.5, 100.5));
        let near = rig.session.near_cells();
        assert!(near.contains(&CellIndex::new(100, 100)));
        assert!(!near.contains(&CellIndex::new(0, 0)));
    }

    // -- outcome surface -----------------------------------------------------

    #[test]
    fn outcome_feedback_and_mutation_flags() {
        assert!(Outcome::Pickup { value: 1 }.mutated());
        assert!(Outcome::Merge { value: 2, victory: false }.mutated());
        assert!(Outcome::Drop { value: 1 }.mutated());
        assert!(!Outcome::RejectTooFar.mutated());
        assert!(!Outcome::RejectEmpty.mutated());
        assert!(!Outcome::RejectMismatch.mutated());
        assert!(!Outcome::RejectFrozen.mutated());
        // Every outcome has a feedback line.
        for outcome in [
            Outcome::Pickup { value: 1 },
            Outcome::Merge { value: 2, victory: true },
            Outcome::Drop { value: 1 },
            Outcome::RejectTooFar,
            Outcome::RejectEmpty,
            Outcome::RejectMismatch,
            Outcome::RejectFrozen,
        ] {
            assert!(!outcome.feedback().is_empty());
        }
    }
}
