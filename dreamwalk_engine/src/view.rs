// Read-only views over the grid for the render layer.
//
// The renderer never touches the store or the spawner directly: it asks
// for the cells covering its viewport and gets back, per cell, everything
// it draws from — bounds, effective value, and whether the cell is within
// interaction range. Activation comes back in through
// `Session::activate`, so the render layer stays write-free.
//
// `near_cells` is the interaction set refreshed after every accepted
// movement: the bounded window of cells the player could activate from
// where they stand.

use crate::grid::Grid;
use crate::store::SpiritStore;
use crate::types::{CellIndex, GeoBounds, GeoPos};
use smallvec::SmallVec;

/// Everything the renderer needs to draw one cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellView {
    pub index: CellIndex,
    pub bounds: GeoBounds,
    /// Effective value: override if present, else spawn value.
    pub value: u32,
    /// Within interaction range of the player.
    pub near: bool,
}

/// Enumerate the cells covering a viewport, south-to-north then
/// west-to-east within each row.
pub fn visible_cells(
    grid: &Grid,
    store: &SpiritStore,
    player: GeoPos,
    viewport: GeoBounds,
) -> Vec<CellView> {
    let (min, max) = grid.cover(viewport);
    // An inverted viewport covers nothing; clamp before sizing.
    let rows = (max.i - min.i + 1).max(0) as usize;
    let cols = (max.j - min.j + 1).max(0) as usize;
    let mut cells = Vec::with_capacity(rows.saturating_mul(cols));
    for i in min.i..=max.i {
        for j in min.j..=max.j {
            let index = CellIndex::new(i, j);
            cells.push(CellView {
                index,
                bounds: grid.cell_bounds(index),
                value: store.get(index),
                near: grid.is_near(player, index),
            });
        }
    }
    cells
}

/// The interaction set: every cell within reach of the player's current
/// (cell-aligned) position. Bounded by the near radius, so it fits a small
/// inline buffer.
pub fn near_cells(grid: &Grid, player: GeoPos) -> SmallVec<[CellIndex; 36]> {
    let center = grid.cell_at(player);
    let half = (grid.near_radius().ceil() as i64) + 1;
    let mut cells = SmallVec::new();
    for i in (center.i - half)..=(center.i + half) {
        for j in (center.j - half)..=(center.j + half) {
            let index = CellIndex::new(i, j);
            if grid.is_near(player, index) {
                cells.push(index);
            }
        }
    }
    cells
}
