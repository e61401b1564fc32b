// Grid coordinate system: continuous geographic position ↔ discrete cells.
//
// The world is an infinite grid of `cell_size` × `cell_size` degree cells.
// A position maps to the cell index by floor division, so every position
// belongs to exactly one half-open rectangle
// `[i·S, (i+1)·S) × [j·S, (j+1)·S)` — floor is consistently biased toward
// negative infinity, so there is no rounding ambiguity at cell boundaries.
//
// Proximity (`is_near`) is a box distance: the latitude and longitude
// offsets from the player's cell-aligned position to the candidate cell's
// south/west corner are tested independently against `near_radius · S`.
// Diagonal neighbors at the same per-axis distance are equally near. This
// is the gameplay contract — do not replace it with a Euclidean test.
//
// See also: `spawn.rs` for what an untouched cell contains, `store.rs` for
// the override store resolved against these indices, `view.rs` for
// enumerating the cell range covering a viewport.

use crate::types::{CellIndex, GeoBounds, GeoPos};

/// Grid geometry parameters, fixed for the lifetime of a session.
#[derive(Clone, Copy, Debug)]
pub struct Grid {
    /// Cell edge length in degrees.
    cell_size: f64,
    /// Interaction radius in cell-size multiples.
    near_radius: f64,
}

impl Grid {
    pub fn new(cell_size: f64, near_radius: f64) -> Self {
        Self {
            cell_size,
            near_radius,
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn near_radius(&self) -> f64 {
        self.near_radius
    }

    /// The cell containing a position.
    pub fn cell_at(&self, pos: GeoPos) -> CellIndex {
        CellIndex::new(
            (pos.lat / self.cell_size).floor() as i64,
            (pos.lng / self.cell_size).floor() as i64,
        )
    }

    /// The half-open geographic rectangle of a cell.
    pub fn cell_bounds(&self, index: CellIndex) -> GeoBounds {
        let south = index.i as f64 * self.cell_size;
        let west = index.j as f64 * self.cell_size;
        GeoBounds {
            south,
            west,
            north: south + self.cell_size,
            east: west + self.cell_size,
        }
    }

    /// The midpoint of a cell.
    pub fn cell_center(&self, index: CellIndex) -> GeoPos {
        self.cell_bounds(index).center()
    }

    /// Normalize a position to the center of its cell. Every accepted
    /// player position goes through this, so the player always rests at a
    /// cell center, never at an arbitrary sub-cell point.
    pub fn snap_to_center(&self, pos: GeoPos) -> GeoPos {
        self.cell_center(self.cell_at(pos))
    }

    /// Whether a cell is within interaction range of the player.
    ///
    /// Both the latitude and longitude distances from the player's
    /// cell-aligned position to the candidate cell's south/west corner must
    /// be within `near_radius · cell_size`.
    pub fn is_near(&self, player: GeoPos, index: CellIndex) -> bool {
        let bounds = self.cell_bounds(index);
        let reach = self.near_radius * self.cell_size;
        (player.lat - bounds.south).abs() <= reach && (player.lng - bounds.west).abs() <= reach
    }

    /// Inclusive index range of the cells covering a viewport: the cell of
    /// the south/west corner through the cell of the north/east corner.
    pub fn cover(&self, viewport: GeoBounds) -> (CellIndex, CellIndex) {
        let min = self.cell_at(GeoPos::new(viewport.south, viewport.west));
        let max = self.cell_at(GeoPos::new(viewport.north, viewport.east));
        (min, max)
    }
}
