//! # Shared Simulation Library
//!
//! Everything both the authoritative server and the predicting client must
//! agree on, byte for byte and unit for unit:
//!
//! - **World geometry** ([`world`]): the playable/movement/spawn rectangles
//!   and the validators applied to every value that crosses the network.
//! - **Wire protocol** ([`protocol`]): the tagged message set and its
//!   little-endian codec. Encode and decode are exact inverses; malformed
//!   datagrams surface as a [`protocol::DecodeError`] and are dropped.
//! - **Sequencing and quality tracking** ([`tracking`]): duplicate and
//!   out-of-order detection plus RTT/jitter/loss statistics, reused
//!   symmetrically on both ends.
//! - **Entity state** ([`entities`]): plain value types for tanks, enemies
//!   and bullets whose constructors and setters enforce the simulation
//!   invariants (normalized rotations, clamped health, id partition).
//! - **Time** ([`time`]): the millisecond wall clock both nodes stamp
//!   messages with; simulation types take an injectable clock for tests.
//!
//! Keeping this crate deterministic and I/O-free is what makes client-side
//! prediction work: the client replays inputs through exactly the code the
//! server runs.

pub mod entities;
pub mod protocol;
pub mod time;
pub mod tracking;
pub mod world;
