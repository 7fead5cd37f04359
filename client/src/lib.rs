//! # Game Client Library
//!
//! Headless client runtime for the arena-tank game: connection management,
//! input transmission, client-side prediction, server reconciliation and
//! entity interpolation. Rendering, windowing and raw input devices are the
//! host's concern; the host feeds an [`game::InputSample`] per frame and
//! reads smooth entity poses back out.
//!
//! ## Module Organization
//!
//! - [`network`]: the [`network::Client`]. UDP session, per-tick pump,
//!   ping/RTT tracking and connection health.
//! - [`game`]: the client's world. Predicted local tank, authoritative
//!   stash plus three-tier reconciliation, enemy and bullet mirrors.
//! - [`prediction`]: input and predicted-state history with the
//!   unacknowledged-input buffer used for replay-on-correction.
//! - [`interpolation`]: per-entity snapshot buffers with time-delayed
//!   interpolation, bounded extrapolation and blend-back.
//!
//! ## Netcode Shape
//!
//! Local input applies immediately through exactly the server's movement
//! rules, so a perfect connection needs no correction at all. Authoritative
//! snapshots continuously re-anchor the prediction (smoothly for small
//! drift, snap-and-replay for large), while every other entity renders from
//! a short, adaptive time delay that absorbs network jitter.

pub mod game;
pub mod interpolation;
pub mod network;
pub mod prediction;
