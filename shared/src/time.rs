//! Wall-clock helper shared by both nodes.
//!
//! Server and client both carry a `clock: fn() -> i64` field defaulting to
//! [`now_ms`] so tests can substitute a deterministic source.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch as a signed 64-bit value, matching the
/// wire representation of timestamps.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
