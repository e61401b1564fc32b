// Core types shared across the engine.
//
// Defines the discrete cell identity (`CellIndex`), continuous geographic
// position (`GeoPos`), cell/viewport rectangles (`GeoBounds`), and the
// persisted movement mode. All types derive `Serialize`/`Deserialize` for
// save/load; `CellIndex` additionally has a canonical `"i,j"` string form
// used as the override key at the persistence boundary.
//
// **Critical constraint: determinism.** Cell identity is derived from
// position by floor division alone (see `grid.rs`). Nothing in this module
// may depend on session state.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Cell identity
// ---------------------------------------------------------------------------

/// The unique identity of one grid cell: integer indices on the latitude
/// (`i`) and longitude (`j`) axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellIndex {
    pub i: i64,
    pub j: i64,
}

impl CellIndex {
    pub const fn new(i: i64, j: i64) -> Self {
        Self { i, j }
    }

    /// Canonical string key, e.g. `"3,-7"`. Used as the override key in the
    /// persisted record; in-memory code keys on the struct itself.
    pub fn key(self) -> String {
        format!("{},{}", self.i, self.j)
    }

    /// Parse a canonical `"i,j"` key. Returns `None` for anything that is
    /// not exactly two comma-separated integers.
    pub fn parse_key(key: &str) -> Option<Self> {
        let (i, j) = key.split_once(',')?;
        Some(Self {
            i: i.parse().ok()?,
            j: j.parse().ok()?,
        })
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.i, self.j)
    }
}

// ---------------------------------------------------------------------------
// Geographic position
// ---------------------------------------------------------------------------

/// A continuous geographic position in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPos {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components are finite numbers. Positions from external feeds
    /// must pass this before the engine accepts them.
    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl fmt::Display for GeoPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// A geographic rectangle. `south`/`west` inclusive, `north`/`east`
/// exclusive — matching the half-open cell rectangles of the grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    pub fn contains(self, pos: GeoPos) -> bool {
        pos.lat >= self.south && pos.lat < self.north && pos.lng >= self.west && pos.lng < self.east
    }

    /// Midpoint of the rectangle.
    pub fn center(self) -> GeoPos {
        GeoPos::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Movement mode
// ---------------------------------------------------------------------------

/// Which movement source variant is active. Persisted as part of the save
/// record under the historical wire names: `"button"` for discrete steps,
/// `"geo"` for continuous tracking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementMode {
    #[default]
    #[serde(rename = "button")]
    Step,
    #[serde(rename = "geo")]
    Tracking,
}

impl fmt::Display for MovementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step => write!(f, "step"),
            Self::Tracking => write!(f, "tracking"),
        }
    }
}
