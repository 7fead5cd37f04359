//! World geometry constants and network-facing validators.
//!
//! The world is a fixed 1280x960 rectangle. Three derived rectangles matter
//! for simulation:
//!
//! - **playable**: the world inset by the border thickness; bullets live here
//! - **movement**: the playable area inset by the tank radius; tank *centers*
//!   are clamped into this rectangle
//! - **spawn**: the movement area inset by a safety margin; spawn positions
//!   and patrol waypoints are drawn from here
//!
//! Validators mirror what the server enforces on incoming packets: positions
//! and rotations are clamped or normalized, names/colors/timestamps are
//! accepted or rejected outright.

use glam::Vec2;

/// Total world width in pixels.
pub const WORLD_WIDTH: f32 = 1280.0;

/// Total world height in pixels.
pub const WORLD_HEIGHT: f32 = 960.0;

/// Thickness of the decorative border around the playable area.
pub const BORDER_THICKNESS: f32 = 48.0;

/// Approximate tank collision radius (players and enemies).
pub const TANK_RADIUS: f32 = 25.0;

/// Enemy tank collision radius.
pub const ENEMY_TANK_RADIUS: f32 = 25.0;

/// Bullet collision radius for the standard rounds.
pub const BULLET_RADIUS: f32 = 4.0;

/// Extra margin beyond border + tank radius used for safe spawning.
pub const SPAWN_SAFETY_MARGIN: f32 = 10.0;

// Playable area (inside the border).
pub const PLAYABLE_MIN_X: f32 = BORDER_THICKNESS;
pub const PLAYABLE_MAX_X: f32 = WORLD_WIDTH - BORDER_THICKNESS;
pub const PLAYABLE_MIN_Y: f32 = BORDER_THICKNESS;
pub const PLAYABLE_MAX_Y: f32 = WORLD_HEIGHT - BORDER_THICKNESS;
pub const PLAYABLE_WIDTH: f32 = PLAYABLE_MAX_X - PLAYABLE_MIN_X;
pub const PLAYABLE_HEIGHT: f32 = PLAYABLE_MAX_Y - PLAYABLE_MIN_Y;

// Movement area: tank centers stay inside this rectangle.
pub const MOVEMENT_MIN_X: f32 = PLAYABLE_MIN_X + TANK_RADIUS;
pub const MOVEMENT_MAX_X: f32 = PLAYABLE_MAX_X - TANK_RADIUS;
pub const MOVEMENT_MIN_Y: f32 = PLAYABLE_MIN_Y + TANK_RADIUS;
pub const MOVEMENT_MAX_Y: f32 = PLAYABLE_MAX_Y - TANK_RADIUS;

// Spawn area: movement area shrunk by the safety margin.
pub const SPAWN_MARGIN: f32 = BORDER_THICKNESS + TANK_RADIUS + SPAWN_SAFETY_MARGIN;
pub const SPAWN_MIN_X: f32 = SPAWN_MARGIN;
pub const SPAWN_MAX_X: f32 = WORLD_WIDTH - SPAWN_MARGIN;
pub const SPAWN_MIN_Y: f32 = SPAWN_MARGIN;
pub const SPAWN_MAX_Y: f32 = WORLD_HEIGHT - SPAWN_MARGIN;

/// World center, used as the join spawn point and respawn fallback.
pub const CENTER_X: f32 = WORLD_WIDTH / 2.0;
pub const CENTER_Y: f32 = WORLD_HEIGHT / 2.0;

/// Rotations on the wire must sit inside this window before normalization.
pub const MIN_ROTATION: f32 = -360.0;
pub const MAX_ROTATION: f32 = 720.0;

/// Maximum accepted player name length in bytes.
pub const MAX_PLAYER_NAME_LENGTH: usize = 50;

/// Maximum accepted |now - timestamp| for any incoming message, in ms.
pub const MAX_TIMESTAMP_DELTA_MS: i64 = 60_000;

/// Normalizes a rotation in degrees to the `[0, 360)` range.
///
/// Non-finite input collapses to 0 so a corrupt packet can never poison
/// stored state. Idempotent: normalizing twice equals normalizing once.
pub fn normalize_rotation(rotation: f32) -> f32 {
    if !rotation.is_finite() {
        return 0.0;
    }
    let r = rotation % 360.0;
    if r < 0.0 {
        r + 360.0
    } else {
        r
    }
}

/// Clamps a single coordinate into `[min, max]`, mapping non-finite input
/// onto the minimum.
pub fn clamp_coord(value: f32, min: f32, max: f32) -> f32 {
    if !value.is_finite() {
        return min;
    }
    value.clamp(min, max)
}

pub fn clamp_position_x(x: f32) -> f32 {
    clamp_coord(x, MOVEMENT_MIN_X, MOVEMENT_MAX_X)
}

pub fn clamp_position_y(y: f32) -> f32 {
    clamp_coord(y, MOVEMENT_MIN_Y, MOVEMENT_MAX_Y)
}

/// Clamps an entity center into the movement rectangle. Idempotent.
pub fn clamp_position(position: Vec2) -> Vec2 {
    Vec2::new(clamp_position_x(position.x), clamp_position_y(position.y))
}

/// True when the position is finite and inside the movement rectangle.
pub fn is_valid_position(x: f32, y: f32) -> bool {
    x.is_finite()
        && y.is_finite()
        && (MOVEMENT_MIN_X..=MOVEMENT_MAX_X).contains(&x)
        && (MOVEMENT_MIN_Y..=MOVEMENT_MAX_Y).contains(&y)
}

/// True when the position is finite and inside the playable rectangle.
/// Bullets use this bound: they may travel outside the movement rectangle
/// but die at the border.
pub fn is_inside_playable(position: Vec2) -> bool {
    position.x.is_finite()
        && position.y.is_finite()
        && (PLAYABLE_MIN_X..=PLAYABLE_MAX_X).contains(&position.x)
        && (PLAYABLE_MIN_Y..=PLAYABLE_MAX_Y).contains(&position.y)
}

/// True when a wire rotation is finite and within the accepted window.
pub fn is_valid_rotation(rotation: f32) -> bool {
    rotation.is_finite() && (MIN_ROTATION..=MAX_ROTATION).contains(&rotation)
}

/// Player names are 1-50 bytes of printable ASCII.
pub fn is_valid_player_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_PLAYER_NAME_LENGTH
        && name.bytes().all(|b| (0x20..=0x7e).contains(&b))
}

/// A timestamp is valid when both it and the reference clock are positive
/// and they disagree by at most 60 seconds.
pub fn is_valid_timestamp(timestamp: i64, now: i64) -> bool {
    timestamp > 0 && now > 0 && (now - timestamp).abs() <= MAX_TIMESTAMP_DELTA_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_rectangles_nest() {
        assert_eq!(MOVEMENT_MIN_X, 73.0);
        assert_eq!(MOVEMENT_MAX_X, 1207.0);
        assert_eq!(MOVEMENT_MIN_Y, 73.0);
        assert_eq!(MOVEMENT_MAX_Y, 887.0);
        assert_eq!(SPAWN_MIN_X, 83.0);
        assert_eq!(SPAWN_MAX_Y, 877.0);
        assert!(PLAYABLE_MIN_X < MOVEMENT_MIN_X);
        assert!(MOVEMENT_MIN_X < SPAWN_MIN_X);
    }

    #[test]
    fn normalize_rotation_wraps_into_range() {
        assert_eq!(normalize_rotation(0.0), 0.0);
        assert_eq!(normalize_rotation(360.0), 0.0);
        assert_eq!(normalize_rotation(450.0), 90.0);
        assert_eq!(normalize_rotation(-90.0), 270.0);
        assert_eq!(normalize_rotation(-720.0), 0.0);
        assert_eq!(normalize_rotation(f32::NAN), 0.0);
        assert_eq!(normalize_rotation(f32::INFINITY), 0.0);
    }

    #[test]
    fn normalize_rotation_is_idempotent() {
        for r in [-1234.5f32, -360.0, -0.25, 0.0, 17.5, 359.999, 360.0, 1000.0] {
            let once = normalize_rotation(r);
            assert_eq!(normalize_rotation(once), once);
            assert!((0.0..360.0).contains(&once));
        }
    }

    #[test]
    fn clamp_position_is_idempotent() {
        let candidates = [
            Vec2::new(-500.0, -500.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(640.0, 480.0),
            Vec2::new(5000.0, 5000.0),
            Vec2::new(f32::NAN, 100.0),
        ];
        for p in candidates {
            let once = clamp_position(p);
            assert_eq!(clamp_position(once), once);
            assert!(is_valid_position(once.x, once.y));
        }
    }

    #[test]
    fn nan_position_clamps_to_rect_minimum() {
        let p = clamp_position(Vec2::new(f32::NAN, f32::INFINITY));
        assert_eq!(p.x, MOVEMENT_MIN_X);
        assert_eq!(p.y, MOVEMENT_MIN_Y);
    }

    #[test]
    fn position_validation_uses_movement_rect() {
        assert!(is_valid_position(73.0, 73.0));
        assert!(is_valid_position(1207.0, 887.0));
        assert!(!is_valid_position(72.9, 100.0));
        assert!(!is_valid_position(100.0, 887.1));
        assert!(!is_valid_position(f32::NAN, 100.0));
    }

    #[test]
    fn rotation_validation_window() {
        assert!(is_valid_rotation(-360.0));
        assert!(is_valid_rotation(720.0));
        assert!(!is_valid_rotation(-360.1));
        assert!(!is_valid_rotation(720.1));
        assert!(!is_valid_rotation(f32::INFINITY));
    }

    #[test]
    fn player_name_rules() {
        assert!(is_valid_player_name("Ada"));
        assert!(is_valid_player_name(&"x".repeat(50)));
        assert!(!is_valid_player_name(""));
        assert!(!is_valid_player_name(&"x".repeat(51)));
        assert!(!is_valid_player_name("tab\tname"));
        assert!(!is_valid_player_name("newline\n"));
    }

    #[test]
    fn timestamp_window_is_sixty_seconds() {
        let now = 1_000_000;
        assert!(is_valid_timestamp(now, now));
        assert!(is_valid_timestamp(now - 60_000, now));
        assert!(is_valid_timestamp(now + 60_000, now));
        assert!(!is_valid_timestamp(now - 60_001, now));
        assert!(!is_valid_timestamp(0, now));
        assert!(!is_valid_timestamp(now, 0));
    }
}
