// Player-visible engine events.
//
// Mutating operations push events here as output; the host drains them
// with `Session::take_events` and maps them to UI, audio, or logging. The
// engine never consults past events for logic — they are write-only from
// its side.
//
// The `Victory` event is the victory signal sink contract: emitted exactly
// once per threshold-crossing merge, before the two-phase timers are
// scheduled.

use crate::types::{CellIndex, GeoPos};
use serde::{Deserialize, Serialize};

/// An event emitted by the engine for the host to react to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// The player picked up a spirit; the cell is now emptied.
    SpiritPicked { index: CellIndex, value: u32 },
    /// The held spirit merged into a cell, doubling it. `value` is the new
    /// cell value.
    SpiritMerged { index: CellIndex, value: u32 },
    /// The held spirit was set down on an empty cell.
    SpiritDropped { index: CellIndex, value: u32 },
    /// The player's position changed (already snapped to a cell center).
    PlayerMoved { position: GeoPos },
    /// A merge reached the victory threshold. Input is now frozen and the
    /// two-phase reset is scheduled.
    Victory { value: u32 },
    /// The victory acknowledgment display period is over.
    VictoryBannerEnded,
    /// The world was reset — overrides cleared, held spirit dropped, save
    /// deleted, starting position re-acquired, input re-enabled.
    WorldReset,
}
