// Procedural spirit generator — the default content of untouched cells.
//
// `Spawner::spirit_at` is a pure function of cell identity: the spawn topic
// label, the cell's `(i, j)` indices, and the world seed are folded into a
// `DreamRng` key, and a single uniform draw is mapped through the spawn
// table's cumulative cutoffs to one of the seed spirit values {4, 2, 1} or
// an empty cell. The topic label namespaces the hash so future features can
// draw independently off the same coordinates without collision.
//
// This referential stability is what lets cells be memory-less until
// touched: the same `(i, j)` yields the same value for the lifetime of a
// world, independent of visit order, viewport, or session. Only the
// override store (`store.rs`) may make a cell diverge from its spawn value.
//
// **Critical constraint: determinism.** No state, no caching, no
// platform-dependent arithmetic — one fresh keyed PRNG stream per call.

use crate::config::SpawnTable;
use crate::types::CellIndex;
use dreamwalk_prng::DreamRng;

/// Deterministic per-cell spirit generator.
#[derive(Clone, Debug)]
pub struct Spawner {
    world_seed: u64,
    table: SpawnTable,
}

impl Spawner {
    pub fn new(world_seed: u64, table: SpawnTable) -> Self {
        Self { world_seed, table }
    }

    /// The default spirit value of a cell. `0` means no spirit present.
    pub fn spirit_at(&self, index: CellIndex) -> u32 {
        let key = format!("{}:{},{}", self.table.topic, index.i, index.j);
        let mut rng = DreamRng::from_key(self.world_seed, key.as_bytes());
        let roll = rng.next_f64();
        if roll < self.table.rare_cutoff {
            4
        } else if roll < self.table.mid_cutoff {
            2
        } else if roll < self.table.common_cutoff {
            1
        } else {
            0
        }
    }
}
