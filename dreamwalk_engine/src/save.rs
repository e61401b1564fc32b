// Persistence codec — the session's durable snapshot format.
//
// The codec is a pure boundary: `encode` takes a complete immutable
// `Snapshot` of session state and produces the JSON record; `decode`
// validates a record wholesale and produces a `Snapshot` or fails as a
// unit. It never holds a live reference into the mutable store, and a
// failed decode adopts nothing.
//
// The wire shape is the historical one and must stay readable:
//
//   {"player":{"lat":..,"lng":..},
//    "heldSpirit": n | null,
//    "overrides": [["i,j", n | {"value": n}], ...],
//    "movementMode": "geo" | "button"}
//
// Override values are written as plain numbers; the wrapped `{value: n}`
// form is still accepted on read (records written by earlier revisions).
// Format changes are signaled by rotating `SAVE_KEY`, not by an in-band
// version field — an old key simply reads as "no save".
//
// See also: `session.rs` for when snapshots are taken (after every
// mutating action) and how decode failures degrade to a fresh session.

use crate::types::{CellIndex, GeoPos, MovementMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The durable slot key. Rotate on breaking format changes.
pub const SAVE_KEY: &str = "dreamwalk-save-v2";

/// Why a save record could not be adopted.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("malformed save record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid save record: {0}")]
    Invalid(&'static str),
}

/// A save-slot write that did not take effect. Non-fatal: the in-memory
/// session stays authoritative.
#[derive(Debug, Error)]
#[error("save slot write failed: {reason}")]
pub struct SlotError {
    pub reason: String,
}

/// A single named durable key-value slot.
///
/// The engine uses it wholesale: one `write` per snapshot, one `read` at
/// startup, one `delete` per new game. Implementations map this onto
/// whatever the platform offers (browser local storage, a file, a row).
pub trait SaveSlot {
    fn read(&mut self) -> Option<String>;
    fn write(&mut self, record: &str) -> Result<(), SlotError>;
    fn delete(&mut self);
}

/// In-memory slot — for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemorySlot {
    record: Option<String>,
}

impl SaveSlot for MemorySlot {
    fn read(&mut self) -> Option<String> {
        self.record.clone()
    }

    fn write(&mut self, record: &str) -> Result<(), SlotError> {
        self.record = Some(record.to_owned());
        Ok(())
    }

    fn delete(&mut self) {
        self.record = None;
    }
}

// ---------------------------------------------------------------------------
// Snapshot — the engine-facing state image
// ---------------------------------------------------------------------------

/// A complete, self-contained image of restorable session state.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub player: GeoPos,
    pub held: Option<u32>,
    pub overrides: Vec<(CellIndex, u32)>,
    pub mode: MovementMode,
}

// ---------------------------------------------------------------------------
// Wire structs
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct WirePlayer {
    lat: f64,
    lng: f64,
}

/// Override value on the wire: plain number, or the legacy wrapped form.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireValue {
    Plain(u32),
    Wrapped { value: u32 },
}

impl WireValue {
    fn value(&self) -> u32 {
        match *self {
            Self::Plain(v) | Self::Wrapped { value: v } => v,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSave {
    player: WirePlayer,
    held_spirit: Option<u32>,
    overrides: Vec<(String, WireValue)>,
    movement_mode: MovementMode,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Serialize a snapshot to the wire record.
///
/// Total for every snapshot the engine can produce: positions are finite
/// (enforced at the input boundary) and the shape contains nothing else
/// serde_json can reject. The `Result` exists so a hypothetical failure
/// degrades like a slot write failure instead of panicking.
pub fn encode(snapshot: &Snapshot) -> Result<String, SaveError> {
    let wire = WireSave {
        player: WirePlayer {
            lat: snapshot.player.lat,
            lng: snapshot.player.lng,
        },
        held_spirit: snapshot.held,
        overrides: snapshot
            .overrides
            .iter()
            .map(|&(index, value)| (index.key(), WireValue::Plain(value)))
            .collect(),
        movement_mode: snapshot.mode,
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Parse and validate a wire record. Any structural anomaly fails the
/// whole record — no field is adopted from a partially valid one.
pub fn decode(record: &str) -> Result<Snapshot, SaveError> {
    let wire: WireSave = serde_json::from_str(record)?;

    let player = GeoPos::new(wire.player.lat, wire.player.lng);
    if !player.is_finite() {
        return Err(SaveError::Invalid("non-finite player position"));
    }
    if wire.held_spirit == Some(0) {
        return Err(SaveError::Invalid("held spirit must be positive"));
    }

    let mut overrides = Vec::with_capacity(wire.overrides.len());
    for (key, value) in &wire.overrides {
        let index = CellIndex::parse_key(key)
            .ok_or(SaveError::Invalid("malformed override key"))?;
        overrides.push((index, value.value()));
    }

    Ok(Snapshot {
        player,
        held: wire.held_spirit,
        overrides,
        mode: wire.movement_mode,
    })
}
