// Sparse override store — the only mutable memory the world has.
//
// Two orthogonal guarantees, both load-bearing:
// - Absence means "never touched": a cell with no entry resolves to its
//   procedural spawn value and costs zero memory (flyweight).
// - Presence means "a complete replacement value for this cell": each
//   entry is a full snapshot of that one cell's state, restorable as-is
//   (memento).
//
// `set` writes unconditionally, **including zero**. A picked-up cell is
// remembered as emptied, not reverted to its spawn value on the next visit
// — otherwise scrolling away and back would farm infinite spirits.
//
// Overrides live in a `BTreeMap` so `entries()` exports in a deterministic
// order and saves are byte-stable across sessions.
//
// See also: `spawn.rs` for the procedural fallback, `save.rs` for how
// entries cross the persistence boundary.

use crate::spawn::Spawner;
use crate::types::CellIndex;
use std::collections::BTreeMap;

/// The world's cell values: procedural defaults shadowed by overrides.
#[derive(Debug)]
pub struct SpiritStore {
    spawner: Spawner,
    overrides: BTreeMap<CellIndex, u32>,
}

impl SpiritStore {
    pub fn new(spawner: Spawner) -> Self {
        Self {
            spawner,
            overrides: BTreeMap::new(),
        }
    }

    /// Effective value of a cell: override if present, else spawn value.
    pub fn get(&self, index: CellIndex) -> u32 {
        self.overrides
            .get(&index)
            .copied()
            .unwrap_or_else(|| self.spawner.spirit_at(index))
    }

    /// Record an override, unconditionally. Writing `0` marks the cell as
    /// emptied; there is no way to un-touch a cell short of `clear()`.
    pub fn set(&mut self, index: CellIndex, value: u32) {
        self.overrides.insert(index, value);
    }

    /// Whether a gameplay action has ever targeted this cell.
    pub fn is_overridden(&self, index: CellIndex) -> bool {
        self.overrides.contains_key(&index)
    }

    /// Drop all overrides. Every cell reverts to its spawn value.
    pub fn clear(&mut self) {
        self.overrides.clear();
    }

    /// Number of overridden cells.
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// Export all overrides in deterministic index order.
    pub fn entries(&self) -> Vec<(CellIndex, u32)> {
        self.overrides.iter().map(|(&k, &v)| (k, v)).collect()
    }

    /// Replace the override set wholesale (restore from a save).
    pub fn load(&mut self, entries: Vec<(CellIndex, u32)>) {
        self.overrides = entries.into_iter().collect();
    }
}
