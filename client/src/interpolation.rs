//! Snapshot interpolation for remote entities.
//!
//! Remote players and enemies render from a time-delayed view of their
//! server snapshots. Each entity keeps a chronological buffer; a shared
//! render clock trails the newest data by an adaptive delay so there is
//! almost always a snapshot pair to interpolate between. When the buffer
//! runs dry the last known velocity carries the entity forward briefly,
//! and the return to real data is blended to avoid a visible snap.
//!
//! Barrel rotation is mouse-driven on its owning client and therefore
//! never extrapolated, only carried and interpolated.

use glam::Vec2;
use log::debug;
use shared::entities::MoveFlags;
use shared::world;
use std::collections::{HashMap, VecDeque};

/// Snapshots kept per entity.
pub const MAX_BUFFER_SIZE: usize = 64;

/// Default render delay behind the newest snapshot, ms.
pub const INTERPOLATION_DELAY_MS: i64 = 100;

/// Render delay bounds, ms.
pub const MIN_DELAY_MS: i64 = 50;
pub const MAX_DELAY_MS: i64 = 200;

/// Longest stretch the last velocity is trusted for, ms.
pub const MAX_EXTRAPOLATION_TIME_MS: i64 = 100;

/// Blend window when returning from extrapolation to interpolation, ms.
pub const EXTRAPOLATION_BLEND_TIME_MS: i64 = 200;

/// Derived velocities are clamped to plausible gameplay speeds.
const MAX_VELOCITY: f32 = 500.0;
const MAX_ANGULAR_VELOCITY: f32 = 1080.0;

/// Snapshot gaps longer than this produce zero derived velocity.
const MAX_VELOCITY_GAP_MS: i64 = 300;

/// One timestamped observation of a remote entity.
#[derive(Debug, Clone, Copy)]
pub struct EntitySnapshot {
    pub timestamp: i64,
    pub position: Vec2,
    pub body_rotation: f32,
    pub barrel_rotation: f32,
    pub moving: MoveFlags,
    /// Derived on insert from the chronologically previous snapshot.
    pub velocity: Vec2,
    /// Degrees per second, derived on insert.
    pub angular_velocity: f32,
}

impl EntitySnapshot {
    pub fn new(
        timestamp: i64,
        position: Vec2,
        body_rotation: f32,
        barrel_rotation: f32,
        moving: MoveFlags,
    ) -> Self {
        EntitySnapshot {
            timestamp,
            position,
            body_rotation,
            barrel_rotation,
            moving,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
        }
    }
}

/// The smoothed pose handed to the renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpolatedState {
    pub position: Vec2,
    pub body_rotation: f32,
    pub barrel_rotation: f32,
    pub is_moving: bool,
    pub was_extrapolated: bool,
}

impl InterpolatedState {
    fn from_snapshot(snapshot: &EntitySnapshot) -> Self {
        InterpolatedState {
            position: snapshot.position,
            body_rotation: snapshot.body_rotation,
            barrel_rotation: snapshot.barrel_rotation,
            is_moving: snapshot.moving.any(),
            was_extrapolated: false,
        }
    }
}

/// Chronological snapshot buffer for a single entity, with interpolation,
/// bounded extrapolation and blend-back.
#[derive(Debug, Default)]
pub struct EntityInterpolationBuffer {
    snapshots: VecDeque<EntitySnapshot>,
    was_extrapolating: bool,
    extrapolation_started_at: i64,
    last_extrapolated: InterpolatedState,
    /// Frame-coherent search hint: the bracket found last frame.
    cached_idx: usize,
}

impl EntityInterpolationBuffer {
    pub fn new() -> Self {
        EntityInterpolationBuffer::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn newest_timestamp(&self) -> Option<i64> {
        self.snapshots.back().map(|s| s.timestamp)
    }

    pub fn oldest_timestamp(&self) -> Option<i64> {
        self.snapshots.front().map(|s| s.timestamp)
    }

    pub fn latest(&self) -> Option<&EntitySnapshot> {
        self.snapshots.back()
    }

    /// Inserts in timestamp order, deriving velocity from the snapshot
    /// chronologically before the insertion point. A duplicate timestamp
    /// replaces the earlier entry.
    pub fn add_snapshot(&mut self, snapshot: EntitySnapshot) {
        let mut snapshot = snapshot;

        let idx = self
            .snapshots
            .partition_point(|s| s.timestamp < snapshot.timestamp);

        if idx > 0 {
            let previous = &self.snapshots[idx - 1];
            snapshot.velocity = derive_velocity(previous, &snapshot);
            snapshot.angular_velocity = derive_angular_velocity(previous, &snapshot);
        }

        match self.snapshots.get(idx) {
            Some(existing) if existing.timestamp == snapshot.timestamp => {
                self.snapshots[idx] = snapshot;
            }
            _ => self.snapshots.insert(idx, snapshot),
        }

        while self.snapshots.len() > MAX_BUFFER_SIZE {
            self.snapshots.pop_front();
            if self.cached_idx > 0 {
                self.cached_idx -= 1;
            }
        }
    }

    /// The smoothed state at `render_time`, or `None` with an empty buffer.
    pub fn state_at(&mut self, render_time: i64) -> Option<InterpolatedState> {
        let newest = match self.snapshots.back() {
            Some(s) => *s,
            None => return None,
        };

        // A lone snapshot is returned verbatim.
        if self.snapshots.len() < 2 {
            return Some(InterpolatedState::from_snapshot(&newest));
        }

        // Past the newest data: project forward on the derived velocity.
        if render_time > newest.timestamp {
            let state = self.extrapolate(&newest, render_time);
            if !self.was_extrapolating {
                self.was_extrapolating = true;
                self.extrapolation_started_at = render_time;
            }
            return Some(state);
        }

        let (before, after) = match self.find_bracket(render_time) {
            Some(pair) => pair,
            None => {
                self.was_extrapolating = false;
                return Some(InterpolatedState::from_snapshot(&newest));
            }
        };

        let span = after.timestamp - before.timestamp;
        let u = if span > 0 {
            (render_time - before.timestamp) as f32 / span as f32
        } else {
            0.0
        };
        let interpolated = interpolate(&before, &after, u);

        // Returning from extrapolation: blend the cached projected state
        // toward real data instead of snapping.
        if self.was_extrapolating {
            let since = render_time - self.extrapolation_started_at;
            let factor = (since as f32 / EXTRAPOLATION_BLEND_TIME_MS as f32).clamp(0.0, 1.0);
            if factor < 1.0 {
                return Some(blend(&self.last_extrapolated, &interpolated, factor));
            }
            self.was_extrapolating = false;
        }

        Some(interpolated)
    }

    /// Drops snapshots older than `render_time - 2 * delay`, always keeping
    /// at least two for interpolation.
    pub fn cleanup(&mut self, render_time: i64, delay: i64) {
        let cutoff = render_time - delay * 2;
        while self.snapshots.len() > 2
            && self
                .snapshots
                .front()
                .is_some_and(|s| s.timestamp < cutoff)
        {
            self.snapshots.pop_front();
            if self.cached_idx > 0 {
                self.cached_idx -= 1;
            }
        }
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.was_extrapolating = false;
        self.cached_idx = 0;
    }

    /// Finds the pair bracketing `render_time`, trying the cached index
    /// first (render time almost always advances monotonically), then
    /// scanning forward and finally backward.
    fn find_bracket(&mut self, render_time: i64) -> Option<(EntitySnapshot, EntitySnapshot)> {
        let n = self.snapshots.len();
        if n < 2 {
            return None;
        }

        let bracket_at = |i: usize, snapshots: &VecDeque<EntitySnapshot>| {
            snapshots[i].timestamp <= render_time && render_time < snapshots[i + 1].timestamp
        };

        if self.cached_idx < n - 1 && bracket_at(self.cached_idx, &self.snapshots) {
            return Some((
                self.snapshots[self.cached_idx],
                self.snapshots[self.cached_idx + 1],
            ));
        }

        for i in (self.cached_idx + 1)..(n - 1) {
            if bracket_at(i, &self.snapshots) {
                self.cached_idx = i;
                return Some((self.snapshots[i], self.snapshots[i + 1]));
            }
        }

        for i in (0..self.cached_idx.min(n - 1)).rev() {
            if bracket_at(i, &self.snapshots) {
                self.cached_idx = i;
                return Some((self.snapshots[i], self.snapshots[i + 1]));
            }
        }

        // Before all data: hold the oldest snapshot (u clamps to zero)
        // rather than extrapolating backward.
        if render_time < self.snapshots[0].timestamp {
            self.cached_idx = 0;
            return Some((self.snapshots[0], self.snapshots[0]));
        }

        // At or past the end with no bracket: use the last pair.
        self.cached_idx = n - 2;
        Some((self.snapshots[n - 2], self.snapshots[n - 1]))
    }

    fn extrapolate(&mut self, latest: &EntitySnapshot, render_time: i64) -> InterpolatedState {
        let ahead_ms = (render_time - latest.timestamp).min(MAX_EXTRAPOLATION_TIME_MS);
        if ahead_ms <= 0 {
            return InterpolatedState::from_snapshot(latest);
        }
        let ahead = ahead_ms as f32 / 1000.0;

        let state = InterpolatedState {
            position: latest.position + latest.velocity * ahead,
            body_rotation: world::normalize_rotation(
                latest.body_rotation + latest.angular_velocity * ahead,
            ),
            // Mouse-driven: never projected.
            barrel_rotation: latest.barrel_rotation,
            is_moving: latest.moving.any(),
            was_extrapolated: true,
        };
        self.last_extrapolated = state;
        state
    }
}

/// LERP position, shortest-path smoothstepped rotations.
fn interpolate(before: &EntitySnapshot, after: &EntitySnapshot, u: f32) -> InterpolatedState {
    let u = u.clamp(0.0, 1.0);
    InterpolatedState {
        position: before.position.lerp(after.position, u),
        body_rotation: interpolate_angle(before.body_rotation, after.body_rotation, u),
        barrel_rotation: interpolate_angle(before.barrel_rotation, after.barrel_rotation, u),
        is_moving: after.moving.any(),
        was_extrapolated: false,
    }
}

/// Blend from the cached extrapolated pose toward fresh interpolated data.
fn blend(
    extrapolated: &InterpolatedState,
    interpolated: &InterpolatedState,
    factor: f32,
) -> InterpolatedState {
    let factor = factor.clamp(0.0, 1.0);
    InterpolatedState {
        position: extrapolated.position.lerp(interpolated.position, factor),
        body_rotation: interpolate_angle(
            extrapolated.body_rotation,
            interpolated.body_rotation,
            factor,
        ),
        barrel_rotation: interpolate_angle(
            extrapolated.barrel_rotation,
            interpolated.barrel_rotation,
            factor,
        ),
        is_moving: interpolated.is_moving,
        was_extrapolated: false,
    }
}

/// Shortest-path angular interpolation with smoothstep easing, result
/// normalized to `[0, 360)`.
pub fn interpolate_angle(a: f32, b: f32, u: f32) -> f32 {
    let mut diff = b - a;
    while diff > 180.0 {
        diff -= 360.0;
    }
    while diff < -180.0 {
        diff += 360.0;
    }
    let eased = u * u * (3.0 - 2.0 * u);
    world::normalize_rotation(a + diff * eased)
}

fn derive_velocity(older: &EntitySnapshot, newer: &EntitySnapshot) -> Vec2 {
    let gap_ms = newer.timestamp - older.timestamp;
    if gap_ms <= 0 || gap_ms > MAX_VELOCITY_GAP_MS {
        return Vec2::ZERO;
    }
    let gap = gap_ms as f32 / 1000.0;
    if gap < 0.001 {
        return Vec2::ZERO;
    }
    let velocity = (newer.position - older.position) / gap;
    let speed = velocity.length();
    if speed > MAX_VELOCITY {
        velocity * (MAX_VELOCITY / speed)
    } else {
        velocity
    }
}

fn derive_angular_velocity(older: &EntitySnapshot, newer: &EntitySnapshot) -> f32 {
    let gap_ms = newer.timestamp - older.timestamp;
    if gap_ms <= 0 || gap_ms > MAX_VELOCITY_GAP_MS {
        return 0.0;
    }
    let gap = gap_ms as f32 / 1000.0;
    if gap < 0.001 {
        return 0.0;
    }
    let mut diff = newer.body_rotation - older.body_rotation;
    while diff > 180.0 {
        diff -= 360.0;
    }
    while diff < -180.0 {
        diff += 360.0;
    }
    (diff / gap).clamp(-MAX_ANGULAR_VELOCITY, MAX_ANGULAR_VELOCITY)
}

/// Interpolation buffers for every remote entity plus the shared render
/// clock and adaptive delay.
pub struct InterpolationManager {
    buffers: HashMap<u32, EntityInterpolationBuffer>,
    render_time: i64,
    delay: i64,
    initialized: bool,
}

impl Default for InterpolationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpolationManager {
    pub fn new() -> Self {
        InterpolationManager {
            buffers: HashMap::new(),
            render_time: 0,
            delay: INTERPOLATION_DELAY_MS,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Anchors the render clock `delay` ms behind the given server time.
    pub fn initialize(&mut self, server_time: i64) {
        self.render_time = server_time - self.delay;
        self.initialized = true;
        debug!(
            "interpolation initialized: render time {} ({} ms behind server)",
            self.render_time, self.delay
        );
    }

    pub fn render_time(&self) -> i64 {
        self.render_time
    }

    pub fn delay(&self) -> i64 {
        self.delay
    }

    /// Adjusts the delay (clamped to `[50, 200]` ms), shifting the render
    /// clock so the currently displayed instant does not jump.
    pub fn set_delay(&mut self, delay_ms: i64) {
        let clamped = delay_ms.clamp(MIN_DELAY_MS, MAX_DELAY_MS);
        if clamped != self.delay {
            self.render_time -= clamped - self.delay;
            self.delay = clamped;
        }
    }

    /// Advances the render clock by wall `dt` and prunes stale snapshots.
    pub fn update(&mut self, dt: f32) {
        if !self.initialized {
            return;
        }
        self.render_time += (dt * 1000.0) as i64;
        for buffer in self.buffers.values_mut() {
            buffer.cleanup(self.render_time, self.delay);
        }
    }

    pub fn add_snapshot(&mut self, entity_id: u32, snapshot: EntitySnapshot) {
        self.buffers
            .entry(entity_id)
            .or_default()
            .add_snapshot(snapshot);
    }

    pub fn state_of(&mut self, entity_id: u32) -> Option<InterpolatedState> {
        let render_time = self.render_time;
        self.buffers.get_mut(&entity_id)?.state_at(render_time)
    }

    pub fn latest_snapshot(&self, entity_id: u32) -> Option<&EntitySnapshot> {
        self.buffers.get(&entity_id)?.latest()
    }

    pub fn remove_entity(&mut self, entity_id: u32) {
        self.buffers.remove(&entity_id);
    }

    pub fn entity_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffered_snapshots(&self) -> usize {
        self.buffers.values().map(|b| b.len()).sum()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
        self.render_time = 0;
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn snapshot(ts: i64, x: f32) -> EntitySnapshot {
        EntitySnapshot::new(ts, Vec2::new(x, 0.0), 0.0, 0.0, MoveFlags::default())
    }

    #[test]
    fn single_snapshot_is_returned_verbatim() {
        let mut buffer = EntityInterpolationBuffer::new();
        buffer.add_snapshot(snapshot(100, 42.0));
        let state = buffer.state_at(250).unwrap();
        assert_eq!(state.position.x, 42.0);
        assert!(!state.was_extrapolated);
    }

    #[test]
    fn empty_buffer_yields_none() {
        let mut buffer = EntityInterpolationBuffer::new();
        assert!(buffer.state_at(100).is_none());
    }

    #[test]
    fn midpoint_interpolation_is_linear_in_position() {
        let mut buffer = EntityInterpolationBuffer::new();
        buffer.add_snapshot(snapshot(100, 0.0));
        buffer.add_snapshot(snapshot(200, 100.0));
        let state = buffer.state_at(150).unwrap();
        assert_approx_eq!(state.position.x, 50.0, 1e-3);
        assert!(!state.was_extrapolated);
    }

    #[test]
    fn snapshots_stay_sorted_under_out_of_order_insertion() {
        let mut buffer = EntityInterpolationBuffer::new();
        buffer.add_snapshot(snapshot(300, 3.0));
        buffer.add_snapshot(snapshot(100, 1.0));
        buffer.add_snapshot(snapshot(200, 2.0));
        let times: Vec<i64> = buffer.snapshots.iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    #[test]
    fn duplicate_timestamp_replaces_entry() {
        let mut buffer = EntityInterpolationBuffer::new();
        buffer.add_snapshot(snapshot(100, 1.0));
        buffer.add_snapshot(snapshot(100, 9.0));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.latest().unwrap().position.x, 9.0);
    }

    #[test]
    fn buffer_is_capped_at_sixty_four() {
        let mut buffer = EntityInterpolationBuffer::new();
        for i in 0..100 {
            buffer.add_snapshot(snapshot(i * 10, i as f32));
        }
        assert_eq!(buffer.len(), MAX_BUFFER_SIZE);
        assert_eq!(buffer.oldest_timestamp(), Some(360));
    }

    #[test]
    fn derived_velocity_matches_position_delta() {
        let mut buffer = EntityInterpolationBuffer::new();
        buffer.add_snapshot(snapshot(0, 0.0));
        buffer.add_snapshot(snapshot(100, 10.0)); // 10 units / 0.1 s
        assert_approx_eq!(buffer.latest().unwrap().velocity.x, 100.0, 1e-3);
    }

    #[test]
    fn derived_velocity_is_clamped() {
        let mut buffer = EntityInterpolationBuffer::new();
        buffer.add_snapshot(snapshot(0, 0.0));
        buffer.add_snapshot(snapshot(100, 1000.0)); // would be 10000 u/s
        assert_approx_eq!(buffer.latest().unwrap().velocity.length(), 500.0, 1e-2);
    }

    #[test]
    fn large_gaps_produce_zero_velocity() {
        let mut buffer = EntityInterpolationBuffer::new();
        buffer.add_snapshot(snapshot(0, 0.0));
        buffer.add_snapshot(snapshot(301, 100.0));
        assert_eq!(buffer.latest().unwrap().velocity, Vec2::ZERO);
    }

    #[test]
    fn extrapolation_projects_on_velocity_and_is_capped() {
        let mut buffer = EntityInterpolationBuffer::new();
        buffer.add_snapshot(snapshot(100, 0.0));
        buffer.add_snapshot(snapshot(200, 10.0)); // 100 u/s

        // 50 ms past the newest snapshot.
        let state = buffer.state_at(250).unwrap();
        assert!(state.was_extrapolated);
        assert_approx_eq!(state.position.x, 15.0, 1e-3);

        // Far past: projection stops at the 100 ms cap.
        let state = buffer.state_at(1000).unwrap();
        assert_approx_eq!(state.position.x, 20.0, 1e-3);
    }

    #[test]
    fn barrel_rotation_is_never_extrapolated() {
        let mut buffer = EntityInterpolationBuffer::new();
        let mut a = snapshot(100, 0.0);
        a.body_rotation = 0.0;
        a.barrel_rotation = 10.0;
        let mut b = snapshot(200, 10.0);
        b.body_rotation = 90.0;
        b.barrel_rotation = 200.0;
        buffer.add_snapshot(a);
        buffer.add_snapshot(b);

        let state = buffer.state_at(260).unwrap();
        assert!(state.was_extrapolated);
        // Body keeps turning on angular velocity; barrel holds.
        assert_approx_eq!(state.barrel_rotation, 200.0, 1e-3);
        assert!(state.body_rotation != 90.0);
    }

    #[test]
    fn blend_back_eases_from_extrapolated_pose() {
        let mut buffer = EntityInterpolationBuffer::new();
        buffer.add_snapshot(snapshot(100, 0.0));
        buffer.add_snapshot(snapshot(200, 100.0)); // 1000 -> clamped 500 u/s

        // Overshoot: extrapolated to 100 + 500 * 0.05 = 125 at t=250.
        let extrapolated = buffer.state_at(250).unwrap();
        assert!(extrapolated.was_extrapolated);

        // Fresh snapshot arrives; render time still near the overshoot.
        buffer.add_snapshot(snapshot(260, 130.0));
        let blended = buffer.state_at(255).unwrap();
        assert!(!blended.was_extrapolated);

        // Pure interpolation at t=255 sits at 127.5; the early blend keeps
        // the result pulled toward the cached extrapolated pose at 125.
        let pure = {
            let mut fresh = EntityInterpolationBuffer::new();
            fresh.add_snapshot(snapshot(200, 100.0));
            fresh.add_snapshot(snapshot(260, 130.0));
            fresh.state_at(255).unwrap().position.x
        };
        assert!(blended.position.x < pure);
        assert!(blended.position.x >= 125.0 - 1e-3);
    }

    #[test]
    fn cleanup_keeps_at_least_two_snapshots() {
        let mut buffer = EntityInterpolationBuffer::new();
        buffer.add_snapshot(snapshot(0, 0.0));
        buffer.add_snapshot(snapshot(10, 1.0));
        buffer.add_snapshot(snapshot(20, 2.0));
        buffer.cleanup(100_000, INTERPOLATION_DELAY_MS);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn angle_interpolation_takes_shortest_path() {
        // 350 -> 10 should pass through 0, not 180.
        let mid = interpolate_angle(350.0, 10.0, 0.5);
        assert!(mid < 20.0 || mid > 340.0, "got {}", mid);

        // Endpoints are exact.
        assert_approx_eq!(interpolate_angle(350.0, 10.0, 0.0), 350.0, 1e-3);
        assert_approx_eq!(interpolate_angle(350.0, 10.0, 1.0), 10.0, 1e-3);
    }

    #[test]
    fn manager_render_clock_trails_server_time() {
        let mut manager = InterpolationManager::new();
        manager.initialize(10_000);
        assert_eq!(manager.render_time(), 10_000 - INTERPOLATION_DELAY_MS);

        manager.update(0.5);
        assert_eq!(manager.render_time(), 10_400);
    }

    #[test]
    fn manager_delay_is_clamped_and_shifts_render_time() {
        let mut manager = InterpolationManager::new();
        manager.initialize(10_000);
        manager.set_delay(500);
        assert_eq!(manager.delay(), MAX_DELAY_MS);
        assert_eq!(manager.render_time(), 10_000 - INTERPOLATION_DELAY_MS - 100);

        manager.set_delay(0);
        assert_eq!(manager.delay(), MIN_DELAY_MS);
    }

    #[test]
    fn manager_tracks_entities_independently() {
        let mut manager = InterpolationManager::new();
        manager.initialize(1000);
        manager.add_snapshot(1, snapshot(900, 1.0));
        manager.add_snapshot(2, snapshot(900, 2.0));
        assert_eq!(manager.entity_count(), 2);
        assert_eq!(manager.state_of(1).unwrap().position.x, 1.0);
        manager.remove_entity(1);
        assert!(manager.state_of(1).is_none());
        assert_eq!(manager.entity_count(), 1);
    }
}
