//! Client-side game state: the predicted local tank, interpolated remote
//! entities, and the reconciliation that keeps prediction honest.
//!
//! The local tank is simulated immediately from raw input with exactly the
//! server's movement rules, so a lossless connection produces zero
//! correction. Authoritative snapshots are stashed per tick and resolved by
//! a three-tier error policy: ignore, smooth, or snap-and-replay.

use crate::interpolation::{EntitySnapshot, InterpolatedState, InterpolationManager};
use crate::prediction::{ClientPrediction, InputFrame, PredictedState};
use glam::Vec2;
use log::{debug, info, warn};
use shared::entities::{
    self, Bullet, BulletKind, MoveFlags, Tank, TankColor, TANK_MOVEMENT_SPEED,
    TANK_ROTATION_SPEED,
};
use shared::protocol::{BulletData, EnemyData, PlayerData};
use shared::world;
use std::collections::HashMap;

/// Position errors below this are noise and ignored.
const IGNORE_THRESHOLD: f32 = 5.0;

/// Errors below this are corrected by smooth interpolation only.
const SMOOTH_CORRECTION_THRESHOLD: f32 = 30.0;

/// Errors below this snap halfway then smooth; anything larger hard-snaps.
const SNAP_CORRECTION_THRESHOLD: f32 = 50.0;

/// Smooth-correction lerp rate, per second.
const RECONCILIATION_RATE: f32 = 6.0;

/// Smoothing stops once the remaining error is this small.
const RECONCILIATION_DONE: f32 = 2.0;

/// One frame of sampled host input.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSample {
    pub moving: MoveFlags,
    /// Mouse position in world coordinates, when the host knows it.
    pub mouse_position: Option<Vec2>,
    pub fire: bool,
}

/// The server's last word on the local player, kept until reconciliation
/// consumes it.
#[derive(Debug, Clone, Copy)]
pub struct ServerAuthoritativeState {
    pub position: Vec2,
    pub body_rotation: f32,
    pub health: f32,
    pub max_health: f32,
    pub score: i32,
    pub is_dead: bool,
}

/// A locally predicted bullet the server has not confirmed yet.
#[derive(Debug)]
struct UnconfirmedBullet {
    bullet: Bullet,
    /// Set once a server bullet update has passed since the shot; the next
    /// update drops the ghost.
    seen_server_update: bool,
}

/// Everything the client knows about the world.
pub struct ClientGame {
    pub local_tank: Tank,
    pub prediction: ClientPrediction,
    pub interpolation: InterpolationManager,
    remote_players: HashMap<u32, PlayerData>,
    enemies: HashMap<u32, EnemyData>,
    bullets: HashMap<u32, BulletData>,
    unconfirmed_bullets: Vec<UnconfirmedBullet>,
    server_state: Option<ServerAuthoritativeState>,
    reconcile_target_position: Vec2,
    reconcile_target_rotation: f32,
    is_reconciling: bool,
    last_acked_input: u32,
}

impl ClientGame {
    pub fn new(name: String, color: TankColor) -> Self {
        ClientGame {
            local_tank: Tank::new(0, name, color, Vec2::new(world::CENTER_X, world::CENTER_Y)),
            prediction: ClientPrediction::new(),
            interpolation: InterpolationManager::new(),
            remote_players: HashMap::new(),
            enemies: HashMap::new(),
            bullets: HashMap::new(),
            unconfirmed_bullets: Vec::new(),
            server_state: None,
            reconcile_target_position: Vec2::ZERO,
            reconcile_target_rotation: 0.0,
            is_reconciling: false,
            last_acked_input: 0,
        }
    }

    pub fn local_player_id(&self) -> u32 {
        self.local_tank.id
    }

    pub fn set_local_player_id(&mut self, player_id: u32) {
        self.local_tank.id = player_id;
    }

    pub fn last_acked_input(&self) -> u32 {
        self.last_acked_input
    }

    // ---- prediction ------------------------------------------------------

    /// Applies one input sample to the predicted tank (the server's exact
    /// movement rules), records it for reconciliation, and returns the
    /// sequenced frame to transmit.
    pub fn predict_input(&mut self, sample: &InputSample, timestamp: i64, dt: f32) -> InputFrame {
        let barrel = match sample.mouse_position {
            Some(mouse) => aim_at(self.local_tank.position, mouse)
                .unwrap_or_else(|| self.local_tank.barrel_rotation()),
            None => self.local_tank.barrel_rotation(),
        };

        let mut frame = InputFrame::new(timestamp, sample.moving, dt, barrel);
        let sequence = self.prediction.store_input(frame.clone());
        frame.sequence = sequence;

        self.apply_frame_to_local(&frame);

        self.prediction.store_predicted_state(PredictedState {
            sequence,
            timestamp,
            position: self.local_tank.position,
            body_rotation: self.local_tank.body_rotation(),
            barrel_rotation: self.local_tank.barrel_rotation(),
        });

        frame
    }

    /// Movement rules shared with the server: turn, then translate along
    /// the facing, then clamp. Also the replay path after a correction.
    fn apply_frame_to_local(&mut self, frame: &InputFrame) {
        let tank = &mut self.local_tank;
        let dt = frame.delta_time;

        if frame.moving.left {
            tank.set_body_rotation(tank.body_rotation() - TANK_ROTATION_SPEED * dt);
        } else if frame.moving.right {
            tank.set_body_rotation(tank.body_rotation() + TANK_ROTATION_SPEED * dt);
        }

        let facing = tank.facing();
        if frame.moving.forward {
            tank.position += facing * TANK_MOVEMENT_SPEED * dt;
        } else if frame.moving.backward {
            tank.position -= facing * TANK_MOVEMENT_SPEED * dt;
        }

        tank.position = world::clamp_position(tank.position);
        tank.set_barrel_rotation(frame.barrel_rotation);
    }

    /// Spawns the local ghost for a fired shot. Returns the bullet's spawn
    /// position and direction for the wire request, or `None` while on
    /// cooldown or dead.
    pub fn try_fire(&mut self) -> Option<(Vec2, Vec2)> {
        if !self.local_tank.can_shoot() {
            return None;
        }
        self.local_tank.shoot_cooldown = entities::TANK_SHOOT_COOLDOWN;

        let spawn = self.local_tank.barrel_end();
        let radians = self.local_tank.barrel_rotation().to_radians();
        let direction = Vec2::new(radians.cos(), radians.sin());

        self.unconfirmed_bullets.push(UnconfirmedBullet {
            bullet: Bullet::new(
                BulletKind::PlayerStandard,
                spawn,
                direction,
                self.local_tank.id,
            ),
            seen_server_update: false,
        });

        Some((spawn, direction))
    }

    // ---- authoritative updates ------------------------------------------

    /// Ingests a GameState snapshot: remote entities feed the interpolation
    /// buffers, the local entry is stashed for reconciliation, and entities
    /// missing from the snapshot are dropped.
    pub fn apply_game_state(
        &mut self,
        players: Vec<PlayerData>,
        enemies: Vec<EnemyData>,
        last_acked_input: u32,
        timestamp: i64,
    ) {
        if !self.interpolation.is_initialized() {
            self.interpolation.initialize(timestamp);
        }

        let local_id = self.local_tank.id;
        let mut seen_players: Vec<u32> = Vec::with_capacity(players.len());

        for player in players {
            if player.player_id == local_id {
                self.stash_authoritative(&player);
                continue;
            }
            seen_players.push(player.player_id);
            let snapshot = EntitySnapshot::new(
                timestamp,
                Vec2::new(player.x, player.y),
                player.body_rotation,
                player.barrel_rotation,
                MoveFlags {
                    forward: player.moving_forward,
                    backward: player.moving_backward,
                    left: player.moving_left,
                    right: player.moving_right,
                },
            );
            self.interpolation.add_snapshot(player.player_id, snapshot);
            self.remote_players.insert(player.player_id, player);
        }

        let departed: Vec<u32> = self
            .remote_players
            .keys()
            .filter(|id| !seen_players.contains(*id))
            .copied()
            .collect();
        for player_id in departed {
            debug!("remote player {} left", player_id);
            self.remote_players.remove(&player_id);
            self.interpolation.remove_entity(player_id);
        }

        let mut seen_enemies: Vec<u32> = Vec::with_capacity(enemies.len());
        for enemy in enemies {
            seen_enemies.push(enemy.enemy_id);
            let snapshot = EntitySnapshot::new(
                timestamp,
                Vec2::new(enemy.x, enemy.y),
                enemy.body_rotation,
                enemy.barrel_rotation,
                MoveFlags::default(),
            );
            self.interpolation.add_snapshot(enemy.enemy_id, snapshot);
            self.enemies.insert(enemy.enemy_id, enemy);
        }
        let destroyed: Vec<u32> = self
            .enemies
            .keys()
            .filter(|id| !seen_enemies.contains(*id))
            .copied()
            .collect();
        for enemy_id in destroyed {
            self.enemies.remove(&enemy_id);
            self.interpolation.remove_entity(enemy_id);
        }

        if last_acked_input > self.last_acked_input {
            self.last_acked_input = last_acked_input;
            self.prediction.cleanup_history(last_acked_input);
        }
    }

    fn stash_authoritative(&mut self, player: &PlayerData) {
        // Health, score and death are server-owned and applied directly;
        // position flows through the tiered reconciliation instead.
        self.local_tank.set_max_health(player.max_health);
        self.local_tank.set_health(player.health);
        self.local_tank.score = player.score;
        self.local_tank.is_dead = player.is_dead;

        self.server_state = Some(ServerAuthoritativeState {
            position: Vec2::new(player.x, player.y),
            body_rotation: player.body_rotation,
            health: player.health,
            max_health: player.max_health,
            score: player.score,
            is_dead: player.is_dead,
        });
    }

    pub fn acknowledge_input(&mut self, acked_sequence: u32) {
        self.prediction.acknowledge_input(acked_sequence);
        if acked_sequence > self.last_acked_input {
            self.last_acked_input = acked_sequence;
        }
    }

    /// Three-tier reconciliation against the stashed authoritative state.
    /// The barrel is mouse-owned and never touched here.
    pub fn reconcile(&mut self, dt: f32) {
        if let Some(auth) = self.server_state.take() {
            let error = self.local_tank.position.distance(auth.position);

            if error < IGNORE_THRESHOLD {
                // Agreement within noise.
            } else if error < SMOOTH_CORRECTION_THRESHOLD {
                self.reconcile_target_position = auth.position;
                self.reconcile_target_rotation = auth.body_rotation;
                self.is_reconciling = true;
            } else if error < SNAP_CORRECTION_THRESHOLD {
                debug!("medium correction: {:.1} units of drift", error);
                let halfway = self
                    .local_tank
                    .position
                    .lerp(auth.position, 0.5);
                self.local_tank.position = world::clamp_position(halfway);
                self.local_tank.set_body_rotation(auth.body_rotation);
                self.reconcile_target_position = auth.position;
                self.reconcile_target_rotation = auth.body_rotation;
                self.is_reconciling = true;
                self.prediction
                    .mark_inputs_for_replay(self.last_acked_input + 1);
            } else {
                warn!("hard snap: {:.1} units of drift", error);
                self.local_tank.position = world::clamp_position(auth.position);
                self.local_tank.set_body_rotation(auth.body_rotation);
                self.is_reconciling = false;
                self.replay_unacknowledged_inputs();
            }
        }

        if self.is_reconciling {
            let factor = (RECONCILIATION_RATE * dt).clamp(0.0, 1.0);
            let target = self.reconcile_target_position;
            self.local_tank.position = self.local_tank.position.lerp(target, factor);

            let current = self.local_tank.body_rotation();
            let mut diff = self.reconcile_target_rotation - current;
            if diff > 180.0 {
                diff -= 360.0;
            }
            if diff < -180.0 {
                diff += 360.0;
            }
            self.local_tank.set_body_rotation(current + diff * factor);

            if self.local_tank.position.distance(target) < RECONCILIATION_DONE {
                self.is_reconciling = false;
            }
        }
    }

    /// Replays every unacknowledged input, in order, against the freshly
    /// snapped state. Replayed frames reuse the barrel rotation captured
    /// with them, so aim history survives the correction.
    fn replay_unacknowledged_inputs(&mut self) {
        self.prediction
            .mark_inputs_for_replay(self.last_acked_input + 1);
        let frames = self.prediction.inputs_to_replay();
        if !frames.is_empty() {
            debug!("replaying {} inputs after snap", frames.len());
        }
        for frame in frames {
            self.apply_frame_to_local(&frame);
        }
        self.prediction.clear_replay_flags();
    }

    // ---- bullets ---------------------------------------------------------

    /// Server bullet list is authoritative: present ids are overwritten,
    /// missing ids are removed. Local ghosts survive one update cycle and
    /// are then dropped whether or not the server confirmed the shot.
    pub fn apply_bullet_update(&mut self, bullets: Vec<BulletData>) {
        self.bullets.clear();
        for bullet in bullets {
            self.bullets.insert(bullet.bullet_id, bullet);
        }

        self.unconfirmed_bullets.retain(|u| !u.seen_server_update);
        for unconfirmed in self.unconfirmed_bullets.iter_mut() {
            unconfirmed.seen_server_update = true;
        }
    }

    /// An enemy fired (or another player's shot was relayed): show a ghost
    /// until the next bullet update carries the real thing.
    pub fn apply_bullet_spawn(&mut self, owner_id: u32, position: Vec2, direction: Vec2) {
        let kind = if entities::is_enemy_id(owner_id) {
            BulletKind::EnemyStandard
        } else {
            BulletKind::PlayerStandard
        };
        self.unconfirmed_bullets.push(UnconfirmedBullet {
            bullet: Bullet::new(kind, position, direction, owner_id),
            seen_server_update: false,
        });
    }

    pub fn apply_bullet_destroy(&mut self, bullet_id: u32) {
        self.bullets.remove(&bullet_id);
    }

    /// Advances local ghosts and confirmed bullets between server updates.
    pub fn step_bullets(&mut self, dt: f32) {
        for unconfirmed in self.unconfirmed_bullets.iter_mut() {
            unconfirmed.bullet.step(dt);
        }
        self.unconfirmed_bullets.retain(|u| !u.bullet.is_expired());

        for bullet in self.bullets.values_mut() {
            bullet.x += bullet.velocity_x * dt;
            bullet.y += bullet.velocity_y * dt;
            bullet.lifetime -= dt;
        }
        self.bullets.retain(|_, b| b.lifetime > 0.0);
    }

    // ---- lifecycle events ------------------------------------------------

    pub fn apply_player_death(&mut self, player_id: u32, score_penalty: i32) {
        if player_id == self.local_tank.id {
            info!("you died (-{} points)", score_penalty);
            self.local_tank.is_dead = true;
            self.local_tank.set_health(0.0);
        } else if let Some(player) = self.remote_players.get_mut(&player_id) {
            player.is_dead = true;
            player.health = 0.0;
        }
    }

    pub fn apply_player_respawn(&mut self, player_id: u32, position: Vec2, health: f32) {
        if player_id == self.local_tank.id {
            info!("respawned at ({:.0}, {:.0})", position.x, position.y);
            self.local_tank.is_dead = false;
            self.local_tank.position = position;
            self.local_tank.set_health(health);
            self.local_tank.set_body_rotation(0.0);
            // Predictions made before death are meaningless now.
            self.prediction.clear();
            self.is_reconciling = false;
            self.server_state = None;
        } else if let Some(player) = self.remote_players.get_mut(&player_id) {
            player.is_dead = false;
            player.health = health;
            player.x = position.x;
            player.y = position.y;
        }
    }

    // ---- render access ---------------------------------------------------

    pub fn remote_player_ids(&self) -> Vec<u32> {
        self.remote_players.keys().copied().collect()
    }

    pub fn remote_player_info(&self, player_id: u32) -> Option<&PlayerData> {
        self.remote_players.get(&player_id)
    }

    /// Time-delayed smooth pose for a remote player or enemy.
    pub fn entity_view(&mut self, entity_id: u32) -> Option<InterpolatedState> {
        self.interpolation.state_of(entity_id)
    }

    pub fn enemy_ids(&self) -> Vec<u32> {
        self.enemies.keys().copied().collect()
    }

    pub fn enemy_info(&self, enemy_id: u32) -> Option<&EnemyData> {
        self.enemies.get(&enemy_id)
    }

    pub fn confirmed_bullets(&self) -> impl Iterator<Item = &BulletData> {
        self.bullets.values()
    }

    pub fn unconfirmed_bullet_count(&self) -> usize {
        self.unconfirmed_bullets.len()
    }

    pub fn is_reconciling(&self) -> bool {
        self.is_reconciling
    }

    pub fn clear(&mut self) {
        self.remote_players.clear();
        self.enemies.clear();
        self.bullets.clear();
        self.unconfirmed_bullets.clear();
        self.prediction.clear();
        self.interpolation.clear();
        self.server_state = None;
        self.is_reconciling = false;
        self.last_acked_input = 0;
    }
}

/// Barrel angle that points from `origin` at `target`, or `None` for a
/// degenerate or non-finite target.
fn aim_at(origin: Vec2, target: Vec2) -> Option<f32> {
    if !target.x.is_finite() || !target.y.is_finite() {
        return None;
    }
    let delta = target - origin;
    if delta.length_squared() < 1e-6 {
        return None;
    }
    Some(world::normalize_rotation(delta.y.atan2(delta.x).to_degrees()))
}
