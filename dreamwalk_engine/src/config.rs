// Data-driven engine configuration.
//
// All tunable parameters live in `GameConfig`, loadable from JSON. The
// engine never uses magic numbers — it reads from the config. Every field
// has a default, and `#[serde(default)]` lets a partial config file
// override only what it names.
//
// See also: `spawn.rs` which consumes `SpawnTable`, `grid.rs` for how cell
// size and near radius shape the world, `session.rs` which owns the config
// for the lifetime of a session.
//
// **Critical constraint: determinism.** `world_seed` and the spawn table
// feed directly into procedural generation; a session restored from a save
// must run under the same config to see the same world.

use crate::types::GeoPos;
use serde::{Deserialize, Serialize};

/// Cumulative cutoffs mapping one uniform draw to a spawned spirit value.
///
/// A draw in `[0, rare_cutoff)` spawns a 4, `[rare_cutoff, mid_cutoff)` a
/// 2, `[mid_cutoff, common_cutoff)` a 1, and anything above leaves the
/// cell empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnTable {
    /// Hash namespace for spirit spawning. Other features hashing off the
    /// same coordinates must use a different topic.
    pub topic: String,
    pub rare_cutoff: f64,
    pub mid_cutoff: f64,
    pub common_cutoff: f64,
}

impl Default for SpawnTable {
    fn default() -> Self {
        Self {
            topic: "spirit".to_owned(),
            rare_cutoff: 0.07,
            mid_cutoff: 0.14,
            common_cutoff: 0.2,
        }
    }
}

/// All tunable engine parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Cell edge length in degrees. ~0.0001° is roughly 11 m of latitude.
    pub cell_size_deg: f64,
    /// Interaction radius in cell-size multiples (per-axis box distance).
    pub near_radius_cells: f64,
    /// A merge producing a value at or above this triggers the victory
    /// sequence. Merges may exceed it — values are unbounded.
    pub victory_threshold: u32,
    /// Seed for procedural generation. Same seed, same world.
    pub world_seed: u64,
    pub spawn: SpawnTable,
    /// Starting position used when the position provider is unavailable.
    pub default_origin: GeoPos,
    /// How long the victory acknowledgment stays up before the banner-end
    /// phase of the victory sequence.
    pub victory_banner_ms: u64,
    /// Delay between banner end and the automatic world reset.
    pub victory_reset_delay_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            cell_size_deg: 0.0001,
            near_radius_cells: 2.5,
            victory_threshold: 64,
            world_seed: 0,
            spawn: SpawnTable::default(),
            default_origin: GeoPos::new(0.0, 0.0),
            victory_banner_ms: 4000,
            victory_reset_delay_ms: 1500,
        }
    }
}

impl GameConfig {
    /// Load a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roundtrips_through_json() {
        let config = GameConfig::default();
        let json = config.to_json().unwrap();
        let restored = GameConfig::from_json(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config = GameConfig::from_json(r#"{"victory_threshold": 128}"#).unwrap();
        assert_eq!(config.victory_threshold, 128);
        assert_eq!(config.cell_size_deg, GameConfig::default().cell_size_deg);
        assert_eq!(config.spawn, SpawnTable::default());
    }

    #[test]
    fn nested_partial_spawn_table() {
        let config =
            GameConfig::from_json(r#"{"spawn": {"topic": "wisp"}}"#).unwrap();
        assert_eq!(config.spawn.topic, "wisp");
        assert_eq!(config.spawn.rare_cutoff, SpawnTable::default().rare_cutoff);
    }

    #[test]
    fn from_json_rejects_invalid_json() {
        assert!(GameConfig::from_json("not a config {{{").is_err());
    }

    #[test]
    fn from_json_rejects_wrong_types() {
        assert!(GameConfig::from_json(r#"{"victory_threshold": "high"}"#).is_err());
    }
}
