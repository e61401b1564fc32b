// dreamwalk_engine — pure Rust grid state engine.
//
// Dreamwalk is a single-player exploration/merge game played over
// real-world coordinates: the player occupies one cell of an infinite grid
// overlaid on geographic space, cells lazily contain procedurally
// generated "spirit" values, and the player picks up, merges (doubling),
// or drops spirits on nearby cells, chasing a victory threshold.
//
// This crate is the whole game state engine and has zero rendering or
// platform dependencies: it can be tested and run headless. Map tiles, DOM
// widgets, audio, and input capture live in host layers that talk to the
// engine through the collaborator traits (`SaveSlot`, `PositionFeed`,
// `StartPositionProvider`) and the read-only view functions.
//
// Module overview:
// - `session.rs`:  Top-level `Session` — activation state machine, victory
//                  sequence, movement pump, persistence triggers.
// - `grid.rs`:     Coordinate system — position ↔ cell index, bounds,
//                  snapping, box-distance proximity.
// - `spawn.rs`:    Procedural spirit generator (pure function of cell
//                  identity).
// - `store.rs`:    Sparse override store — the only mutable world memory.
// - `movement.rs`: Step / tracking movement sources behind one capability.
// - `save.rs`:     Persistence codec and the durable slot contract.
// - `timer.rs`:    Scheduled engine timers (two-phase victory transition).
// - `event.rs`:    Player-visible events drained by the host.
// - `config.rs`:   `GameConfig` — every tunable in one serde struct.
// - `types.rs`:    `CellIndex`, `GeoPos`, `GeoBounds`, `MovementMode`.
// - `view.rs`:     Renderer-facing cell enumeration.
// - `prng`:        Re-exported from `dreamwalk_prng` — xoshiro256++ with
//                  SplitMix64 seeding and byte-key derivation.
//
// **Critical constraint: determinism.** Untouched world content is a pure
// function of `(world_seed, topic, i, j)`. All mutation flows through
// `Session` on discrete events; collections iterate in `BTreeMap` order;
// the only clock is the host-supplied `advance(now_ms)` value.

pub mod config;
pub mod event;
pub mod grid;
pub mod movement;
pub mod save;
pub mod session;
pub mod spawn;
pub mod store;
pub mod timer;
pub mod types;
pub mod view;
pub use dreamwalk_prng as prng;
