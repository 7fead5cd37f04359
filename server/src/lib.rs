//! # Authoritative Server Library
//!
//! The server owns the canonical world: player tanks, AI enemies, bullets,
//! scores and lifecycles. Clients predict, but whatever this crate computes
//! is the truth they converge to.
//!
//! ## Module Organization
//!
//! - [`game`]: the [`game::GameServer`] tick pipeline. Ingest validated
//!   client datagrams, simulate players/enemies/bullets, resolve collisions,
//!   separation, death and respawn, broadcast snapshots, reap idle clients.
//! - [`enemy`]: the per-enemy AI state machine (idle/patrol/chase/attack/
//!   retreat) with steering, boundary avoidance, burst fire and accuracy
//!   spread.
//!
//! ## Design Notes
//!
//! The server core is a single-threaded state machine over a non-blocking
//! UDP socket; the binary drives [`game::GameServer::update`] from its own
//! tick loop. Randomness (spawns, waypoints, spread, respawn placement)
//! comes from one seeded RNG so a given seed replays the same world, and
//! the wall clock is injectable for deterministic tests.

pub mod enemy;
pub mod game;
