//! Simulation entity value types shared by server and client.
//!
//! These are plain data with constructors and setters that enforce the
//! state invariants: rotations are normalized on write, health stays inside
//! `[0, max_health]`, ids respect the partition (players < 1000 <= enemies
//! < 10000 <= bullets). Nothing here touches the network or a renderer.

use crate::world;
use glam::Vec2;
use log::warn;

/// First id handed out to enemies. Player ids stay below this.
pub const ENEMY_ID_START: u32 = 1000;

/// First id handed out to bullets. Enemy ids stay below this.
pub const BULLET_ID_START: u32 = 10_000;

/// True when `owner_id` belongs to an enemy rather than a player.
pub fn is_enemy_id(id: u32) -> bool {
    (ENEMY_ID_START..BULLET_ID_START).contains(&id)
}

/// Circle-vs-circle overlap test used by every collision path.
pub fn circles_overlap(a: Vec2, radius_a: f32, b: Vec2, radius_b: f32) -> bool {
    let r = radius_a + radius_b;
    a.distance_squared(b) < r * r
}

/// The small set of tank colors the server will accept on join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TankColor {
    Red,
    Blue,
    Green,
    Black,
}

impl TankColor {
    pub const ALL: [TankColor; 4] = [
        TankColor::Red,
        TankColor::Blue,
        TankColor::Green,
        TankColor::Black,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TankColor::Red => "red",
            TankColor::Blue => "blue",
            TankColor::Green => "green",
            TankColor::Black => "black",
        }
    }

    /// Parses a wire color string against the whitelist.
    pub fn parse(name: &str) -> Option<TankColor> {
        match name {
            "red" => Some(TankColor::Red),
            "blue" => Some(TankColor::Blue),
            "green" => Some(TankColor::Green),
            "black" => Some(TankColor::Black),
            _ => None,
        }
    }
}

/// Four-directional movement flags carried by inputs and snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveFlags {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl MoveFlags {
    pub fn any(self) -> bool {
        self.forward || self.backward || self.left || self.right
    }
}

/// Player movement speed in units per second.
pub const TANK_MOVEMENT_SPEED: f32 = 150.0;

/// Player body rotation speed in degrees per second.
pub const TANK_ROTATION_SPEED: f32 = 200.0;

/// Seconds between player shots.
pub const TANK_SHOOT_COOLDOWN: f32 = 1.0;

/// Distance from tank center to the barrel muzzle.
pub const TANK_BARREL_LENGTH: f32 = 30.0;

/// Seconds a dead player waits before respawning.
pub const RESPAWN_COOLDOWN: f32 = 5.0;

/// Score removed on death, floored at zero.
pub const DEATH_PENALTY: i32 = 100;

/// A player-controlled tank.
///
/// The server owns the authoritative copy; the client keeps a predicted one
/// for the local player. Barrel rotation is a client-supplied hint (mouse
/// aim) that the server accepts verbatim after normalization.
#[derive(Debug, Clone)]
pub struct Tank {
    pub id: u32,
    pub name: String,
    pub color: TankColor,
    pub position: Vec2,
    body_rotation: f32,
    barrel_rotation: f32,
    pub moving: MoveFlags,
    health: f32,
    max_health: f32,
    pub score: i32,
    pub is_dead: bool,
    pub respawn_timer: f32,
    pub shoot_cooldown: f32,
}

impl Tank {
    pub fn new(id: u32, name: String, color: TankColor, position: Vec2) -> Self {
        Tank {
            id,
            name,
            color,
            position,
            body_rotation: 0.0,
            barrel_rotation: 0.0,
            moving: MoveFlags::default(),
            health: 100.0,
            max_health: 100.0,
            score: 0,
            is_dead: false,
            respawn_timer: 0.0,
            shoot_cooldown: 0.0,
        }
    }

    pub fn body_rotation(&self) -> f32 {
        self.body_rotation
    }

    pub fn barrel_rotation(&self) -> f32 {
        self.barrel_rotation
    }

    /// Stores a body rotation, normalized to `[0, 360)`.
    pub fn set_body_rotation(&mut self, rotation: f32) {
        self.body_rotation = world::normalize_rotation(rotation);
    }

    /// Stores a barrel rotation, normalized to `[0, 360)`.
    pub fn set_barrel_rotation(&mut self, rotation: f32) {
        self.barrel_rotation = world::normalize_rotation(rotation);
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    /// Sets health clamped into `[0, max_health]`.
    pub fn set_health(&mut self, health: f32) {
        self.health = health.clamp(0.0, self.max_health);
    }

    /// Sets the health ceiling. Non-positive values are refused with a
    /// warning; current health is re-clamped under the new ceiling.
    pub fn set_max_health(&mut self, max_health: f32) {
        if max_health <= 0.0 || !max_health.is_finite() {
            warn!("ignoring invalid max health {} for tank {}", max_health, self.id);
            return;
        }
        self.max_health = max_health;
        if self.health > self.max_health {
            self.health = self.max_health;
        }
    }

    /// Applies damage; negative values are logged and ignored.
    pub fn take_damage(&mut self, damage: f32) {
        if damage < 0.0 || !damage.is_finite() {
            warn!("ignoring invalid damage {} for tank {}", damage, self.id);
            return;
        }
        self.health = (self.health - damage).max(0.0);
    }

    pub fn heal(&mut self, amount: f32) {
        if amount < 0.0 || !amount.is_finite() {
            warn!("ignoring invalid heal {} for tank {}", amount, self.id);
            return;
        }
        self.health = (self.health + amount).min(self.max_health);
    }

    /// A non-positive health is the death condition.
    pub fn is_health_depleted(&self) -> bool {
        self.health <= 0.0
    }

    /// Unit vector of the body facing.
    pub fn facing(&self) -> Vec2 {
        let radians = self.body_rotation.to_radians();
        Vec2::new(radians.cos(), radians.sin())
    }

    /// Where bullets leave the barrel.
    pub fn barrel_end(&self) -> Vec2 {
        let radians = self.barrel_rotation.to_radians();
        self.position + Vec2::new(radians.cos(), radians.sin()) * TANK_BARREL_LENGTH
    }

    pub fn can_shoot(&self) -> bool {
        self.shoot_cooldown <= 0.0 && !self.is_dead
    }

    pub fn tick_cooldown(&mut self, dt: f32) {
        if self.shoot_cooldown > 0.0 {
            self.shoot_cooldown = (self.shoot_cooldown - dt).max(0.0);
        }
    }
}

/// Enemy tank variants. Each selects a stat bundle via [`EnemyKind::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnemyKind {
    Red,
    Black,
    Purple,
    Orange,
    Teal,
}

impl EnemyKind {
    pub fn from_wire(raw: u8) -> Option<EnemyKind> {
        match raw {
            0 => Some(EnemyKind::Red),
            1 => Some(EnemyKind::Black),
            2 => Some(EnemyKind::Purple),
            3 => Some(EnemyKind::Orange),
            4 => Some(EnemyKind::Teal),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            EnemyKind::Red => 0,
            EnemyKind::Black => 1,
            EnemyKind::Purple => 2,
            EnemyKind::Orange => 3,
            EnemyKind::Teal => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EnemyKind::Red => "red",
            EnemyKind::Black => "black armored",
            EnemyKind::Purple => "purple fast",
            EnemyKind::Orange => "orange heavy",
            EnemyKind::Teal => "teal scout",
        }
    }

    /// Numeric parameter bundle for this variant.
    pub fn stats(self) -> EnemyStats {
        match self {
            // Balanced baseline.
            EnemyKind::Red => EnemyStats {
                max_health: 100.0,
                movement_speed: 80.0,
                rotation_speed: 120.0,
                score_value: 10,
                detection_range: 400.0,
                attack_range: 250.0,
                retreat_health_threshold: 0.3,
                aggression_level: 0.5,
                shoot_cooldown: 1.5,
                base_accuracy: 0.6,
                accuracy_spread_deg: 15.0,
                burst_size: 3,
            },
            // Armored: slow, tough, accurate single shots.
            EnemyKind::Black => EnemyStats {
                max_health: 200.0,
                movement_speed: 50.0,
                rotation_speed: 80.0,
                score_value: 25,
                detection_range: 350.0,
                attack_range: 300.0,
                retreat_health_threshold: 0.2,
                aggression_level: 0.3,
                shoot_cooldown: 2.5,
                base_accuracy: 0.8,
                accuracy_spread_deg: 8.0,
                burst_size: 1,
            },
            // Fast and fragile, sprays long bursts.
            EnemyKind::Purple => EnemyStats {
                max_health: 60.0,
                movement_speed: 150.0,
                rotation_speed: 200.0,
                score_value: 15,
                detection_range: 500.0,
                attack_range: 200.0,
                retreat_health_threshold: 0.5,
                aggression_level: 0.7,
                shoot_cooldown: 0.8,
                base_accuracy: 0.4,
                accuracy_spread_deg: 25.0,
                burst_size: 5,
            },
            // Heavy: very slow, very accurate, worth the most.
            EnemyKind::Orange => EnemyStats {
                max_health: 300.0,
                movement_speed: 40.0,
                rotation_speed: 60.0,
                score_value: 50,
                detection_range: 300.0,
                attack_range: 350.0,
                retreat_health_threshold: 0.15,
                aggression_level: 0.8,
                shoot_cooldown: 3.0,
                base_accuracy: 0.9,
                accuracy_spread_deg: 5.0,
                burst_size: 1,
            },
            // Scout: mobile mid-range skirmisher.
            EnemyKind::Teal => EnemyStats {
                max_health: 80.0,
                movement_speed: 120.0,
                rotation_speed: 150.0,
                score_value: 12,
                detection_range: 450.0,
                attack_range: 220.0,
                retreat_health_threshold: 0.4,
                aggression_level: 0.6,
                shoot_cooldown: 1.2,
                base_accuracy: 0.7,
                accuracy_spread_deg: 12.0,
                burst_size: 2,
            },
        }
    }
}

/// Per-variant enemy parameters. `aggression_level` is carried for tuning
/// but does not currently gate any transition.
#[derive(Debug, Clone, Copy)]
pub struct EnemyStats {
    pub max_health: f32,
    pub movement_speed: f32,
    pub rotation_speed: f32,
    pub score_value: i32,
    pub detection_range: f32,
    pub attack_range: f32,
    pub retreat_health_threshold: f32,
    pub aggression_level: f32,
    pub shoot_cooldown: f32,
    pub base_accuracy: f32,
    pub accuracy_spread_deg: f32,
    pub burst_size: u32,
}

/// Bullet variants with distinct ballistic profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulletKind {
    PlayerStandard,
    EnemyStandard,
    Shell,
    Tracer,
}

impl BulletKind {
    pub fn from_wire(raw: u8) -> Option<BulletKind> {
        match raw {
            0 => Some(BulletKind::PlayerStandard),
            1 => Some(BulletKind::EnemyStandard),
            2 => Some(BulletKind::Shell),
            3 => Some(BulletKind::Tracer),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            BulletKind::PlayerStandard => 0,
            BulletKind::EnemyStandard => 1,
            BulletKind::Shell => 2,
            BulletKind::Tracer => 3,
        }
    }

    pub fn stats(self) -> BulletStats {
        match self {
            BulletKind::PlayerStandard => BulletStats {
                speed: 500.0,
                damage: 25.0,
                lifetime: 3.0,
                radius: 4.0,
            },
            BulletKind::EnemyStandard => BulletStats {
                speed: 450.0,
                damage: 20.0,
                lifetime: 3.0,
                radius: 4.0,
            },
            BulletKind::Shell => BulletStats {
                speed: 300.0,
                damage: 50.0,
                lifetime: 5.0,
                radius: 6.0,
            },
            BulletKind::Tracer => BulletStats {
                speed: 600.0,
                damage: 20.0,
                lifetime: 2.5,
                radius: 4.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BulletStats {
    pub speed: f32,
    pub damage: f32,
    pub lifetime: f32,
    pub radius: f32,
}

/// A projectile in flight. Server-owned; clients only mirror wire copies.
#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: u32,
    pub owner_id: u32,
    pub kind: BulletKind,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Visual rotation in degrees, derived from the firing direction.
    pub rotation: f32,
    pub damage: f32,
    pub radius: f32,
    pub lifetime: f32,
    pub max_lifetime: f32,
    destroyed: bool,
}

impl Bullet {
    /// Builds a bullet from a (possibly unnormalized) direction. Degenerate
    /// directions fall back to +X rather than producing a stationary round.
    pub fn new(kind: BulletKind, position: Vec2, direction: Vec2, owner_id: u32) -> Self {
        let stats = kind.stats();
        let direction = if direction.length_squared() > 0.001 * 0.001 {
            direction.normalize()
        } else {
            warn!("bullet from {} had a degenerate direction, firing +x", owner_id);
            Vec2::X
        };
        Bullet {
            id: 0,
            owner_id,
            kind,
            position,
            velocity: direction * stats.speed,
            rotation: direction.y.atan2(direction.x).to_degrees(),
            damage: stats.damage,
            radius: stats.radius,
            lifetime: stats.lifetime,
            max_lifetime: stats.lifetime,
            destroyed: false,
        }
    }

    /// Ballistic integration step: advance along velocity, burn lifetime.
    pub fn step(&mut self, dt: f32) {
        if self.destroyed || dt < 0.0 || !dt.is_finite() {
            return;
        }
        self.position += self.velocity * dt;
        self.lifetime -= dt;
        if !self.position.x.is_finite() || !self.position.y.is_finite() {
            warn!("bullet {} reached a non-finite position, destroying", self.id);
            self.destroyed = true;
        }
    }

    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Expired bullets are removed from the world: either the lifetime ran
    /// out or a collision destroyed them.
    pub fn is_expired(&self) -> bool {
        self.destroyed || self.lifetime <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn tank() -> Tank {
        Tank::new(1, "Ada".into(), TankColor::Blue, Vec2::new(640.0, 480.0))
    }

    #[test]
    fn tank_starts_alive_and_full() {
        let t = tank();
        assert_eq!(t.health(), 100.0);
        assert_eq!(t.max_health(), 100.0);
        assert!(!t.is_dead);
        assert!(!t.is_health_depleted());
    }

    #[test]
    fn rotations_normalize_on_write() {
        let mut t = tank();
        t.set_body_rotation(450.0);
        assert_approx_eq!(t.body_rotation(), 90.0, 1e-4);
        t.set_barrel_rotation(-45.0);
        assert_approx_eq!(t.barrel_rotation(), 315.0, 1e-4);
    }

    #[test]
    fn health_setter_clamps() {
        let mut t = tank();
        t.set_health(250.0);
        assert_eq!(t.health(), 100.0);
        t.set_health(-10.0);
        assert_eq!(t.health(), 0.0);
    }

    #[test]
    fn invalid_max_health_is_a_no_op() {
        let mut t = tank();
        t.set_max_health(0.0);
        assert_eq!(t.max_health(), 100.0);
        t.set_max_health(-50.0);
        assert_eq!(t.max_health(), 100.0);
        t.set_max_health(150.0);
        assert_eq!(t.max_health(), 150.0);
    }

    #[test]
    fn negative_damage_is_ignored() {
        let mut t = tank();
        t.take_damage(-25.0);
        assert_eq!(t.health(), 100.0);
        t.take_damage(30.0);
        assert_eq!(t.health(), 70.0);
    }

    #[test]
    fn exact_zero_health_is_death() {
        let mut t = tank();
        t.take_damage(100.0);
        assert!(t.is_health_depleted());
        let mut t = tank();
        t.set_health(0.0001);
        assert!(!t.is_health_depleted());
    }

    #[test]
    fn barrel_end_follows_barrel_rotation() {
        let mut t = tank();
        t.set_barrel_rotation(0.0);
        let end = t.barrel_end();
        assert_approx_eq!(end.x, t.position.x + TANK_BARREL_LENGTH, 1e-3);
        assert_approx_eq!(end.y, t.position.y, 1e-3);
    }

    #[test]
    fn id_partition() {
        assert!(!is_enemy_id(999));
        assert!(is_enemy_id(1000));
        assert!(is_enemy_id(9999));
        assert!(!is_enemy_id(10_000));
    }

    #[test]
    fn enemy_kind_wire_roundtrip() {
        for kind in [
            EnemyKind::Red,
            EnemyKind::Black,
            EnemyKind::Purple,
            EnemyKind::Orange,
            EnemyKind::Teal,
        ] {
            assert_eq!(EnemyKind::from_wire(kind.to_wire()), Some(kind));
        }
        assert_eq!(EnemyKind::from_wire(5), None);
    }

    #[test]
    fn bullet_integrates_and_expires() {
        let mut b = Bullet::new(
            BulletKind::PlayerStandard,
            Vec2::new(100.0, 100.0),
            Vec2::X,
            1,
        );
        b.step(0.1);
        assert_approx_eq!(b.position.x, 150.0, 1e-3);
        assert_approx_eq!(b.lifetime, 2.9, 1e-4);
        b.step(3.0);
        assert!(b.is_expired());
    }

    #[test]
    fn degenerate_direction_falls_back_to_x() {
        let b = Bullet::new(BulletKind::Tracer, Vec2::ZERO, Vec2::ZERO, 1);
        assert!(b.velocity.x > 0.0);
        assert_eq!(b.velocity.y, 0.0);
    }

    #[test]
    fn bullet_lifetime_bounded_by_kind() {
        for kind in [
            BulletKind::PlayerStandard,
            BulletKind::EnemyStandard,
            BulletKind::Shell,
            BulletKind::Tracer,
        ] {
            let b = Bullet::new(kind, Vec2::ZERO, Vec2::X, 1);
            assert!(b.lifetime <= kind.stats().lifetime);
        }
    }

    #[test]
    fn circle_overlap_boundary() {
        let a = Vec2::ZERO;
        assert!(circles_overlap(a, 25.0, Vec2::new(28.9, 0.0), 4.0));
        // Exact touch along the edge does not count as a collision.
        assert!(!circles_overlap(a, 25.0, Vec2::new(29.0, 0.0), 4.0));
        assert!(!circles_overlap(a, 25.0, Vec2::new(29.1, 0.0), 4.0));
    }

    #[test]
    fn color_parse_whitelist() {
        assert_eq!(TankColor::parse("red"), Some(TankColor::Red));
        assert_eq!(TankColor::parse("black"), Some(TankColor::Black));
        assert_eq!(TankColor::parse("purple"), None);
        assert_eq!(TankColor::parse(""), None);
    }
}
