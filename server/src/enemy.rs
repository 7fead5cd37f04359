//! AI-controlled enemy tanks.
//!
//! Each enemy runs a five-state machine (idle, patrol, chase, attack,
//! retreat) driven once per server tick. The server owns target selection;
//! the enemy owns steering, aiming and fire control. All randomness flows
//! through the caller's RNG so a seeded server replays identically.

use glam::Vec2;
use log::debug;
use rand::Rng;
use shared::entities::{EnemyKind, EnemyStats};
use shared::world;

/// Distance at which a patrol waypoint counts as reached, and the minimum
/// distance at which steering still translates.
const WAYPOINT_REACHED_DISTANCE: f32 = 50.0;

/// Seconds spent waiting at a reached waypoint before rolling a new one.
const PATROL_WAIT_DURATION: f32 = 2.0;

/// Seconds of idling before the enemy starts patrolling.
const IDLE_DURATION: f32 = 3.0;

/// Distance from tank center to the barrel muzzle.
const BARREL_LENGTH: f32 = 20.0;

/// Positions closer than this to any world edge are considered unsafe for
/// plain steering.
const SAFE_EDGE_MARGIN: f32 = 80.0;

/// Within this distance of an edge the steering blend toward the world
/// center ramps up linearly.
const STEER_BLEND_DISTANCE: f32 = 200.0;

/// Speed multiplier while avoidance steering is active.
const AVOIDANCE_SPEED_FACTOR: f32 = 0.7;

/// Within this distance of a movement-rect edge a retreating enemy counts
/// as pinned against the boundary.
const BOUNDARY_STUCK_DISTANCE: f32 = 50.0;

/// How far ahead a retreat target is projected.
const RETREAT_TARGET_DISTANCE: f32 = 200.0;

/// Margin kept from the movement rect when clamping a retreat target.
const RETREAT_SAFETY_MARGIN: f32 = 100.0;

/// How far ahead `move_away_from` projects its flee target.
const FLEE_TARGET_DISTANCE: f32 = 300.0;

/// Movement-rect inset for random interior retreat positions.
const INTERIOR_MARGIN: f32 = 150.0;

/// Movement-rect inset for the four retreat corners.
const CORNER_MARGIN: f32 = 130.0;

/// Cooldown multiplier applied after a full burst.
const BURST_COOLDOWN_FACTOR: f32 = 1.5;

/// Behavior states of the enemy state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiState {
    Idle,
    Patrol,
    Chase,
    Attack,
    Retreat,
}

impl AiState {
    pub fn name(self) -> &'static str {
        match self {
            AiState::Idle => "idle",
            AiState::Patrol => "patrol",
            AiState::Chase => "chase",
            AiState::Attack => "attack",
            AiState::Retreat => "retreat",
        }
    }
}

/// An AI-driven enemy tank. Server-side only; clients see [`shared::protocol::EnemyData`].
#[derive(Debug)]
pub struct EnemyTank {
    pub id: u32,
    pub kind: EnemyKind,
    pub position: Vec2,
    body_rotation: f32,
    barrel_rotation: f32,
    health: f32,
    stats: EnemyStats,
    state: AiState,
    state_timer: f32,
    target_player_id: u32,
    last_known_target: Vec2,
    patrol_waypoint: Vec2,
    patrol_wait_timer: f32,
    shoot_cooldown: f32,
    shots_in_burst: u32,
}

impl EnemyTank {
    pub fn new<R: Rng>(id: u32, kind: EnemyKind, position: Vec2, rng: &mut R) -> Self {
        let stats = kind.stats();
        let mut enemy = EnemyTank {
            id,
            kind,
            position,
            body_rotation: 0.0,
            barrel_rotation: 0.0,
            health: stats.max_health,
            stats,
            state: AiState::Patrol,
            state_timer: 0.0,
            target_player_id: 0,
            last_known_target: position,
            patrol_waypoint: position,
            patrol_wait_timer: 0.0,
            shoot_cooldown: 0.0,
            shots_in_burst: 0,
        };
        enemy.roll_patrol_waypoint(rng);
        enemy
    }

    pub fn state(&self) -> AiState {
        self.state
    }

    pub fn body_rotation(&self) -> f32 {
        self.body_rotation
    }

    pub fn barrel_rotation(&self) -> f32 {
        self.barrel_rotation
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn max_health(&self) -> f32 {
        self.stats.max_health
    }

    pub fn stats(&self) -> &EnemyStats {
        &self.stats
    }

    pub fn radius(&self) -> f32 {
        world::ENEMY_TANK_RADIUS
    }

    pub fn score_value(&self) -> i32 {
        self.stats.score_value
    }

    pub fn shoot_cooldown(&self) -> f32 {
        self.shoot_cooldown
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0.0
    }

    pub fn take_damage(&mut self, damage: f32) {
        if damage < 0.0 || !damage.is_finite() {
            debug!("enemy {} ignoring invalid damage {}", self.id, damage);
            return;
        }
        self.health = (self.health - damage).max(0.0);
    }

    pub fn has_target(&self) -> bool {
        self.target_player_id != 0
    }

    pub fn target_player_id(&self) -> u32 {
        self.target_player_id
    }

    pub fn last_known_target(&self) -> Vec2 {
        self.last_known_target
    }

    /// Called by the server when it picks or refreshes this enemy's target.
    pub fn set_target(&mut self, player_id: u32, position: Vec2) {
        if player_id == 0 {
            self.clear_target();
            return;
        }
        self.target_player_id = player_id;
        self.last_known_target = position;
    }

    pub fn clear_target(&mut self) {
        self.target_player_id = 0;
        self.last_known_target = self.position;
    }

    /// One simulation step of cooldown, state machine and aiming.
    pub fn update<R: Rng>(&mut self, dt: f32, rng: &mut R) {
        if dt < 0.0 || !dt.is_finite() {
            debug!("enemy {} skipping invalid dt {}", self.id, dt);
            return;
        }

        if self.shoot_cooldown > 0.0 {
            self.shoot_cooldown = (self.shoot_cooldown - dt).max(0.0);
        }
        self.state_timer += dt;

        // Low health preempts whatever the enemy was doing.
        if self.should_retreat() && self.state != AiState::Retreat {
            self.transition(AiState::Retreat, rng);
        }

        match self.state {
            AiState::Idle => self.update_idle(dt, rng),
            AiState::Patrol => self.update_patrol(dt, rng),
            AiState::Chase => self.update_chase(dt, rng),
            AiState::Attack => self.update_attack(dt, rng),
            AiState::Retreat => self.update_retreat(dt, rng),
        }

        // Whatever the state did, a held target owns the barrel.
        if self.has_target() {
            self.barrel_rotation = self.angle_to(self.last_known_target);
        }
    }

    fn transition<R: Rng>(&mut self, next: AiState, rng: &mut R) {
        if self.state == next {
            return;
        }
        debug!(
            "enemy {} ({}): {} -> {}",
            self.id,
            self.kind.name(),
            self.state.name(),
            next.name()
        );
        self.state = next;
        self.state_timer = 0.0;
        match next {
            AiState::Idle => self.target_player_id = 0,
            AiState::Patrol => {
                self.roll_patrol_waypoint(rng);
                self.patrol_wait_timer = 0.0;
            }
            AiState::Chase => self.patrol_wait_timer = 0.0,
            AiState::Attack | AiState::Retreat => {}
        }
    }

    fn should_retreat(&self) -> bool {
        self.health / self.stats.max_health <= self.stats.retreat_health_threshold
    }

    fn update_idle<R: Rng>(&mut self, dt: f32, rng: &mut R) {
        // Scan lazily with the barrel while standing still.
        self.barrel_rotation = world::normalize_rotation(self.barrel_rotation + 20.0 * dt);
        if self.state_timer > IDLE_DURATION {
            self.transition(AiState::Patrol, rng);
        }
    }

    fn update_patrol<R: Rng>(&mut self, dt: f32, rng: &mut R) {
        if self.has_target() && self.distance_to(self.last_known_target) <= self.stats.detection_range {
            self.transition(AiState::Chase, rng);
            return;
        }

        if self.distance_to(self.patrol_waypoint) <= WAYPOINT_REACHED_DISTANCE {
            self.patrol_wait_timer += dt;
            if self.patrol_wait_timer >= PATROL_WAIT_DURATION {
                self.roll_patrol_waypoint(rng);
                self.patrol_wait_timer = 0.0;
            }
            self.barrel_rotation = world::normalize_rotation(self.barrel_rotation + 30.0 * dt);
        } else {
            let waypoint = self.patrol_waypoint;
            self.move_towards_with_avoidance(waypoint, dt);
            self.barrel_rotation = self.angle_to(waypoint);
        }
    }

    fn update_chase<R: Rng>(&mut self, dt: f32, rng: &mut R) {
        if !self.has_target() {
            self.transition(AiState::Patrol, rng);
            return;
        }
        let distance = self.distance_to(self.last_known_target);

        // Enter attack earlier than the attack state exits (0.7x vs 1.5x)
        // so the two states do not oscillate at the boundary.
        if distance <= self.stats.attack_range * 0.7 {
            self.transition(AiState::Attack, rng);
            return;
        }
        if distance > self.stats.detection_range * 1.5 {
            self.clear_target();
            self.transition(AiState::Patrol, rng);
            return;
        }

        let target = self.last_known_target;
        self.move_towards_with_avoidance(target, dt);
        self.barrel_rotation = self.angle_to(target);
    }

    fn update_attack<R: Rng>(&mut self, dt: f32, rng: &mut R) {
        if !self.has_target() {
            self.transition(AiState::Patrol, rng);
            return;
        }
        let target = self.last_known_target;
        let distance = self.distance_to(target);

        if distance > self.stats.attack_range * 1.5 {
            self.transition(AiState::Chase, rng);
            return;
        }

        // Hold the optimal band: back up when crowded, close when too far,
        // otherwise keep the hull pointed at the target.
        let optimal_min = self.stats.attack_range * 0.6;
        let optimal_max = self.stats.attack_range * 1.1;
        if distance < optimal_min {
            self.move_away_from(target, dt);
        } else if distance > optimal_max {
            self.move_towards_with_avoidance(target, dt);
        } else {
            self.rotate_towards(target, dt);
        }

        self.barrel_rotation = self.angle_to(target);

        let target_angle = self.angle_to(target);
        let mut aim_error = (target_angle - self.barrel_rotation).abs();
        if aim_error > 180.0 {
            aim_error = 360.0 - aim_error;
        }

        // Looser aim for distant targets to compensate for their movement.
        let aim_threshold = if distance > self.stats.attack_range * 0.8 {
            75.0
        } else if distance > self.stats.attack_range * 0.5 {
            60.0
        } else {
            45.0
        };

        if aim_error <= aim_threshold && self.can_shoot() {
            self.try_shoot();
        }
    }

    fn update_retreat<R: Rng>(&mut self, dt: f32, rng: &mut R) {
        if !self.should_retreat() {
            self.transition(AiState::Patrol, rng);
            return;
        }

        let stuck = self.distance_to_nearest_boundary() < BOUNDARY_STUCK_DISTANCE;

        if self.has_target() {
            let threat = self.last_known_target;
            if stuck {
                let retreat_target = self.safe_retreat_position(threat);
                self.move_towards_with_avoidance(retreat_target, dt);
            } else {
                self.move_away_from(threat, dt);
            }
            // Barrel stays on the threat while falling back.
            self.barrel_rotation = self.angle_to(threat);
        } else if stuck {
            let interior = self.random_interior_position(rng);
            self.move_towards_with_avoidance(interior, dt);
        } else {
            let corner = self.farthest_safe_corner();
            self.move_towards_with_avoidance(corner, dt);
        }
    }

    /// Fires if the cooldown allows and the enemy is attacking; returns
    /// whether a shot happened. After `burst_size` consecutive shots the
    /// next cooldown is stretched by 1.5x and the burst restarts.
    pub fn try_shoot(&mut self) -> bool {
        if !self.can_shoot() || self.state != AiState::Attack {
            return false;
        }
        self.shoot_cooldown = self.stats.shoot_cooldown;
        self.shots_in_burst += 1;
        if self.shots_in_burst >= self.stats.burst_size {
            self.shoot_cooldown *= BURST_COOLDOWN_FACTOR;
            self.shots_in_burst = 0;
        }
        true
    }

    pub fn can_shoot(&self) -> bool {
        self.shoot_cooldown <= 0.0
    }

    /// Unit vector the barrel points along.
    pub fn aim_direction(&self) -> Vec2 {
        let radians = self.barrel_rotation.to_radians();
        Vec2::new(radians.cos(), radians.sin())
    }

    /// Where bullets leave the barrel.
    pub fn barrel_end(&self) -> Vec2 {
        self.position + self.aim_direction() * BARREL_LENGTH
    }

    /// Rotates a firing direction by a random angle inside
    /// `+/-(1 - accuracy) * spread`. Perfect accuracy passes through.
    pub fn apply_accuracy_spread<R: Rng>(&self, direction: Vec2, rng: &mut R) -> Vec2 {
        let spread = (1.0 - self.stats.base_accuracy) * self.stats.accuracy_spread_deg;
        if spread < 0.01 {
            return direction;
        }
        let offset = rng.gen_range(-spread..=spread).to_radians();
        let (sin, cos) = offset.sin_cos();
        let rotated = Vec2::new(
            direction.x * cos - direction.y * sin,
            direction.x * sin + direction.y * cos,
        );
        rotated.normalize_or_zero()
    }

    pub fn distance_to(&self, target: Vec2) -> f32 {
        self.position.distance(target)
    }

    /// Angle from this enemy to `target` in degrees, normalized to `[0, 360)`.
    pub fn angle_to(&self, target: Vec2) -> f32 {
        let delta = target - self.position;
        world::normalize_rotation(delta.y.atan2(delta.x).to_degrees())
    }

    /// Turns the hull toward `target` by at most `rotation_speed * dt`,
    /// snapping when the remaining difference is within one step.
    fn rotate_towards(&mut self, target: Vec2, dt: f32) {
        let target_angle = self.angle_to(target);
        let current = world::normalize_rotation(self.body_rotation);

        let mut diff = target_angle - current;
        if diff > 180.0 {
            diff -= 360.0;
        }
        if diff < -180.0 {
            diff += 360.0;
        }

        let step = self.stats.rotation_speed * dt;
        if diff.abs() < step {
            self.body_rotation = target_angle;
        } else if diff > 0.0 {
            self.body_rotation = world::normalize_rotation(current + step);
        } else {
            self.body_rotation = world::normalize_rotation(current - step);
        }
    }

    fn facing(&self) -> Vec2 {
        let radians = self.body_rotation.to_radians();
        Vec2::new(radians.cos(), radians.sin())
    }

    /// Basic steering: rotate, then advance along the facing. Always ends
    /// clamped inside the movement rectangle.
    fn move_towards(&mut self, target: Vec2, dt: f32) {
        self.rotate_towards(target, dt);
        if self.distance_to(target) > WAYPOINT_REACHED_DISTANCE {
            self.position += self.facing() * self.stats.movement_speed * dt;
            self.position = world::clamp_position(self.position);
        }
    }

    fn move_away_from(&mut self, threat: Vec2, dt: f32) {
        let away = (self.position - threat).normalize_or_zero();
        let away = if away == Vec2::ZERO { Vec2::X } else { away };
        let flee_target = self.position + away * FLEE_TARGET_DISTANCE;
        self.move_towards(flee_target, dt);
    }

    /// Steering with boundary avoidance: when the intended step would end
    /// near a world edge, the heading is blended toward the world center
    /// (more strongly the closer the edge) and speed drops to 70%.
    fn move_towards_with_avoidance(&mut self, target: Vec2, dt: f32) {
        self.rotate_towards(target, dt);
        if self.distance_to(target) <= WAYPOINT_REACHED_DISTANCE {
            return;
        }

        let dir = self.facing();
        let intended = self.position + dir * self.stats.movement_speed * dt;

        if Self::is_position_safe(intended) {
            self.position = intended;
        } else {
            let center = Vec2::new(world::CENTER_X, world::CENTER_Y);
            let to_center = (center - self.position).normalize_or_zero();
            if to_center != Vec2::ZERO {
                let edge_distance = self.distance_to_nearest_world_edge();
                let center_weight = (1.0 - edge_distance / STEER_BLEND_DISTANCE).max(0.0);
                let blended =
                    (dir * (1.0 - center_weight) + to_center * center_weight).normalize_or_zero();
                self.position +=
                    blended * self.stats.movement_speed * dt * AVOIDANCE_SPEED_FACTOR;
            }
        }

        self.position = world::clamp_position(self.position);
    }

    /// Safe means at least [`SAFE_EDGE_MARGIN`] from every world edge.
    fn is_position_safe(position: Vec2) -> bool {
        position.x > SAFE_EDGE_MARGIN
            && position.x < world::WORLD_WIDTH - SAFE_EDGE_MARGIN
            && position.y > SAFE_EDGE_MARGIN
            && position.y < world::WORLD_HEIGHT - SAFE_EDGE_MARGIN
    }

    fn distance_to_nearest_world_edge(&self) -> f32 {
        let horizontal = world::WORLD_WIDTH / 2.0 - (self.position.x - world::CENTER_X).abs();
        let vertical = world::WORLD_HEIGHT / 2.0 - (self.position.y - world::CENTER_Y).abs();
        horizontal.min(vertical)
    }

    fn distance_to_nearest_boundary(&self) -> f32 {
        let left = self.position.x - world::MOVEMENT_MIN_X;
        let right = world::MOVEMENT_MAX_X - self.position.x;
        let top = self.position.y - world::MOVEMENT_MIN_Y;
        let bottom = world::MOVEMENT_MAX_Y - self.position.y;
        left.min(right).min(top).min(bottom)
    }

    /// Retreat target when pinned at a boundary: 60% away from the threat,
    /// 40% toward the center, projected 200 units out and clamped well
    /// inside the movement rectangle.
    fn safe_retreat_position(&self, threat: Vec2) -> Vec2 {
        let away = {
            let v = (self.position - threat).normalize_or_zero();
            if v == Vec2::ZERO {
                Vec2::X
            } else {
                v
            }
        };
        let center = Vec2::new(
            (world::MOVEMENT_MIN_X + world::MOVEMENT_MAX_X) / 2.0,
            (world::MOVEMENT_MIN_Y + world::MOVEMENT_MAX_Y) / 2.0,
        );
        let toward_center = (center - self.position).normalize_or_zero();

        let blended = (away * 0.6 + toward_center * 0.4).normalize_or_zero();
        let target = self.position + blended * RETREAT_TARGET_DISTANCE;

        Vec2::new(
            target.x.clamp(
                world::MOVEMENT_MIN_X + RETREAT_SAFETY_MARGIN,
                world::MOVEMENT_MAX_X - RETREAT_SAFETY_MARGIN,
            ),
            target.y.clamp(
                world::MOVEMENT_MIN_Y + RETREAT_SAFETY_MARGIN,
                world::MOVEMENT_MAX_Y - RETREAT_SAFETY_MARGIN,
            ),
        )
    }

    fn random_interior_position<R: Rng>(&self, rng: &mut R) -> Vec2 {
        Vec2::new(
            rng.gen_range(
                world::MOVEMENT_MIN_X + INTERIOR_MARGIN..world::MOVEMENT_MAX_X - INTERIOR_MARGIN,
            ),
            rng.gen_range(
                world::MOVEMENT_MIN_Y + INTERIOR_MARGIN..world::MOVEMENT_MAX_Y - INTERIOR_MARGIN,
            ),
        )
    }

    fn farthest_safe_corner(&self) -> Vec2 {
        let corners = [
            Vec2::new(
                world::MOVEMENT_MIN_X + CORNER_MARGIN,
                world::MOVEMENT_MIN_Y + CORNER_MARGIN,
            ),
            Vec2::new(
                world::MOVEMENT_MAX_X - CORNER_MARGIN,
                world::MOVEMENT_MIN_Y + CORNER_MARGIN,
            ),
            Vec2::new(
                world::MOVEMENT_MIN_X + CORNER_MARGIN,
                world::MOVEMENT_MAX_Y - CORNER_MARGIN,
            ),
            Vec2::new(
                world::MOVEMENT_MAX_X - CORNER_MARGIN,
                world::MOVEMENT_MAX_Y - CORNER_MARGIN,
            ),
        ];
        let mut best = corners[0];
        let mut best_distance = self.distance_to(best);
        for corner in &corners[1..] {
            let d = self.distance_to(*corner);
            if d > best_distance {
                best_distance = d;
                best = *corner;
            }
        }
        best
    }

    fn roll_patrol_waypoint<R: Rng>(&mut self, rng: &mut R) {
        self.patrol_waypoint = Vec2::new(
            rng.gen_range(world::SPAWN_MIN_X..world::SPAWN_MAX_X),
            rng.gen_range(world::SPAWN_MIN_Y..world::SPAWN_MAX_Y),
        );
    }

    #[cfg(test)]
    pub(crate) fn patrol_waypoint(&self) -> Vec2 {
        self.patrol_waypoint
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: AiState) {
        self.state = state;
        self.state_timer = 0.0;
    }

    #[cfg(test)]
    pub(crate) fn set_health_for_test(&mut self, health: f32) {
        self.health = health;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn enemy(kind: EnemyKind) -> EnemyTank {
        EnemyTank::new(1000, kind, Vec2::new(640.0, 480.0), &mut rng())
    }

    #[test]
    fn spawns_patrolling_at_full_health() {
        let e = enemy(EnemyKind::Red);
        assert_eq!(e.state(), AiState::Patrol);
        assert_eq!(e.health(), 100.0);
        assert!(!e.has_target());
    }

    #[test]
    fn patrol_waypoint_is_inside_spawn_rect() {
        let mut r = rng();
        for seed_step in 0..50 {
            let e = EnemyTank::new(1000 + seed_step, EnemyKind::Teal, Vec2::new(200.0, 200.0), &mut r);
            let wp = e.patrol_waypoint();
            assert!((world::SPAWN_MIN_X..world::SPAWN_MAX_X).contains(&wp.x));
            assert!((world::SPAWN_MIN_Y..world::SPAWN_MAX_Y).contains(&wp.y));
        }
    }

    #[test]
    fn idle_becomes_patrol_after_three_seconds() {
        let mut e = enemy(EnemyKind::Red);
        let mut r = rng();
        e.force_state(AiState::Idle);
        e.update(2.9, &mut r);
        assert_eq!(e.state(), AiState::Idle);
        e.update(0.2, &mut r);
        assert_eq!(e.state(), AiState::Patrol);
    }

    #[test]
    fn low_health_forces_retreat_from_any_state() {
        let mut r = rng();
        for state in [AiState::Idle, AiState::Patrol, AiState::Chase, AiState::Attack] {
            let mut e = enemy(EnemyKind::Red);
            e.force_state(state);
            e.set_target(1, Vec2::new(700.0, 480.0));
            e.set_health_for_test(29.0); // threshold is 30% of 100
            e.update(0.016, &mut r);
            assert_eq!(e.state(), AiState::Retreat, "from {:?}", state);
        }
    }

    #[test]
    fn retreat_ends_when_health_recovers() {
        let mut e = enemy(EnemyKind::Red);
        let mut r = rng();
        e.force_state(AiState::Retreat);
        e.set_health_for_test(90.0);
        e.update(0.016, &mut r);
        assert_eq!(e.state(), AiState::Patrol);
    }

    #[test]
    fn patrol_chases_target_inside_detection_range() {
        let mut e = enemy(EnemyKind::Red);
        let mut r = rng();
        e.set_target(1, e.position + Vec2::new(300.0, 0.0));
        e.update(0.016, &mut r);
        assert_eq!(e.state(), AiState::Chase);
    }

    #[test]
    fn patrol_ignores_target_outside_detection_range() {
        let mut e = enemy(EnemyKind::Red);
        let mut r = rng();
        e.set_target(1, e.position + Vec2::new(450.0, 0.0));
        e.update(0.016, &mut r);
        assert_eq!(e.state(), AiState::Patrol);
    }

    #[test]
    fn chase_enters_attack_at_seventy_percent_range() {
        let mut e = enemy(EnemyKind::Red); // attack range 250
        let mut r = rng();
        e.force_state(AiState::Chase);
        e.set_target(1, e.position + Vec2::new(170.0, 0.0)); // < 175
        e.update(0.016, &mut r);
        assert_eq!(e.state(), AiState::Attack);
    }

    #[test]
    fn chase_loses_target_beyond_one_point_five_detection() {
        let mut e = enemy(EnemyKind::Red); // detection 400
        let mut r = rng();
        e.force_state(AiState::Chase);
        e.set_target(1, e.position + Vec2::new(601.0, 0.0));
        e.update(0.016, &mut r);
        assert_eq!(e.state(), AiState::Patrol);
        assert!(!e.has_target());
    }

    #[test]
    fn attack_falls_back_to_chase_beyond_exit_range() {
        let mut e = enemy(EnemyKind::Red);
        let mut r = rng();
        e.force_state(AiState::Attack);
        e.set_target(1, e.position + Vec2::new(376.0, 0.0)); // > 1.5 * 250
        e.update(0.016, &mut r);
        assert_eq!(e.state(), AiState::Chase);
    }

    #[test]
    fn attack_backs_off_when_too_close() {
        let mut e = enemy(EnemyKind::Red);
        let mut r = rng();
        e.force_state(AiState::Attack);
        let threat = e.position + Vec2::new(100.0, 0.0); // < 0.6 * 250
        e.set_target(1, threat);
        let before = e.distance_to(threat);
        // Long enough for the hull to swing around and actually withdraw.
        for _ in 0..300 {
            e.update(0.016, &mut r);
        }
        assert!(e.distance_to(threat) > before);
    }

    #[test]
    fn attack_fires_when_aimed_and_ready() {
        let mut e = enemy(EnemyKind::Red);
        let mut r = rng();
        e.force_state(AiState::Attack);
        // Inside the optimal band so the enemy only rotates.
        e.set_target(1, e.position + Vec2::new(200.0, 0.0));
        e.update(0.016, &mut r);
        // Barrel snapped onto the target; cooldown must have started.
        assert!(e.shoot_cooldown() > 0.0);
    }

    #[test]
    fn burst_extends_final_cooldown() {
        let mut e = enemy(EnemyKind::Red); // burst 3, cooldown 1.5
        e.force_state(AiState::Attack);
        assert!(e.try_shoot());
        assert_approx_eq!(e.shoot_cooldown(), 1.5, 1e-4);
        e.shoot_cooldown = 0.0;
        assert!(e.try_shoot());
        e.shoot_cooldown = 0.0;
        // Third shot of the burst carries the extended cooldown.
        assert!(e.try_shoot());
        assert_approx_eq!(e.shoot_cooldown(), 2.25, 1e-4);
        e.shoot_cooldown = 0.0;
        // Burst counter reset; back to the base cooldown.
        assert!(e.try_shoot());
        assert_approx_eq!(e.shoot_cooldown(), 1.5, 1e-4);
    }

    #[test]
    fn try_shoot_requires_attack_state() {
        let mut e = enemy(EnemyKind::Red);
        e.force_state(AiState::Patrol);
        assert!(!e.try_shoot());
    }

    #[test]
    fn accuracy_spread_stays_within_bounds_and_unit_length() {
        let e = enemy(EnemyKind::Purple); // accuracy 0.4, spread 25 => +/-15 deg
        let mut r = rng();
        let max_offset = (1.0 - 0.4f32) * 25.0;
        for _ in 0..200 {
            let out = e.apply_accuracy_spread(Vec2::X, &mut r);
            assert_approx_eq!(out.length(), 1.0, 1e-4);
            let angle = out.y.atan2(out.x).to_degrees().abs();
            assert!(angle <= max_offset + 1e-3, "spread {} too wide", angle);
        }
    }

    #[test]
    fn avoidance_keeps_enemy_inside_movement_rect() {
        let mut e = EnemyTank::new(
            1000,
            EnemyKind::Purple,
            Vec2::new(world::MOVEMENT_MIN_X + 1.0, world::MOVEMENT_MIN_Y + 1.0),
            &mut rng(),
        );
        // Drive hard toward the corner; the clamp must hold.
        for _ in 0..300 {
            e.move_towards_with_avoidance(Vec2::new(-500.0, -500.0), 0.016);
            assert!(e.position.x >= world::MOVEMENT_MIN_X);
            assert!(e.position.y >= world::MOVEMENT_MIN_Y);
        }
    }

    #[test]
    fn rotate_towards_takes_shortest_path_and_snaps() {
        let mut e = enemy(EnemyKind::Red);
        e.body_rotation = 350.0;
        // Target directly along +X from the enemy (angle 0): shortest path
        // is +10 degrees, not -350.
        let target = e.position + Vec2::new(100.0, 0.0);
        e.rotate_towards(target, 0.05); // step = 120 * 0.05 = 6 deg
        assert_approx_eq!(e.body_rotation(), 356.0, 1e-3);
        e.rotate_towards(target, 0.05);
        // Remaining 4 degrees are inside one step: snap to target.
        assert_approx_eq!(e.body_rotation(), 0.0, 1e-3);
    }

    #[test]
    fn retreat_target_respects_safety_margin() {
        let e = EnemyTank::new(
            1000,
            EnemyKind::Red,
            Vec2::new(world::MOVEMENT_MIN_X + 5.0, 480.0),
            &mut rng(),
        );
        let target = e.safe_retreat_position(Vec2::new(640.0, 480.0));
        assert!(target.x >= world::MOVEMENT_MIN_X + RETREAT_SAFETY_MARGIN);
        assert!(target.x <= world::MOVEMENT_MAX_X - RETREAT_SAFETY_MARGIN);
        assert!(target.y >= world::MOVEMENT_MIN_Y + RETREAT_SAFETY_MARGIN);
        assert!(target.y <= world::MOVEMENT_MAX_Y - RETREAT_SAFETY_MARGIN);
    }
}
