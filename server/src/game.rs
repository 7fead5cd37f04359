//! The authoritative game server.
//!
//! A [`GameServer`] owns a non-blocking UDP socket and the canonical world
//! state. The host drives it with [`GameServer::update`] at its tick rate;
//! one call runs the full pipeline: ingest datagrams, simulate players,
//! enemies and bullets, resolve collisions and deaths, broadcast snapshots,
//! and reap idle clients. Nothing here blocks and nothing here panics on
//! peer input.

use crate::enemy::EnemyTank;
use glam::Vec2;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::entities::{
    self, Bullet, BulletKind, EnemyKind, MoveFlags, Tank, TankColor, DEATH_PENALTY,
    RESPAWN_COOLDOWN, TANK_MOVEMENT_SPEED, TANK_ROTATION_SPEED,
};
use shared::protocol::{BulletData, DestroyReason, EnemyData, Message, PlayerData, MAX_DATAGRAM_SIZE};
use shared::time;
use shared::tracking::SequenceValidator;
use shared::world;
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, UdpSocket};

/// Default server port.
pub const DEFAULT_PORT: u16 = 53000;

/// Lowest port accepted from configuration; port 0 is still allowed
/// programmatically for ephemeral test sockets.
pub const MIN_PORT: u16 = 1024;

/// Datagrams drained per tick before yielding back to the simulation.
const MAX_MESSAGES_PER_TICK: usize = 200;

/// Consecutive send failures before a client is considered lost.
const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Units per second of positional separation applied to overlapping tanks.
const SEPARATION_SPEED: f32 = 200.0;

/// Minimum gap enforced between separated tanks.
const MIN_SEPARATION: f32 = 2.0;

/// Minimum distance from enemies and live players for a respawn point.
const MIN_RESPAWN_CLEARANCE: f32 = 200.0;

/// Attempts at finding a clear respawn point before falling back to center.
const MAX_RESPAWN_ATTEMPTS: u32 = 10;

/// Server tunables. Defaults match the reference tick rates.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Seconds between GameState broadcasts.
    pub snapshot_interval: f32,
    /// Seconds between BulletUpdate broadcasts.
    pub bullet_update_interval: f32,
    /// Seconds between enemy spawn attempts.
    pub enemy_spawn_interval: f32,
    /// Seconds of input silence before a client is dropped.
    pub idle_timeout: f32,
    /// RNG seed for spawns, AI and accuracy spread.
    pub seed: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: DEFAULT_PORT,
            snapshot_interval: 0.022,
            bullet_update_interval: 0.033,
            enemy_spawn_interval: 5.0,
            idle_timeout: 15.0,
            seed: 0,
        }
    }
}

/// Per-connection bookkeeping around the authoritative [`Tank`].
struct ClientInfo {
    addr: SocketAddr,
    tank: Tank,
    sequences: SequenceValidator,
    last_acked_input: u32,
    idle_time: f32,
    consecutive_errors: u32,
    is_active: bool,
}

impl ClientInfo {
    fn new(addr: SocketAddr, tank: Tank) -> Self {
        ClientInfo {
            addr,
            tank,
            sequences: SequenceValidator::new(),
            last_acked_input: 0,
            idle_time: 0.0,
            consecutive_errors: 0,
            is_active: true,
        }
    }
}

/// The authoritative server node.
pub struct GameServer {
    socket: UdpSocket,
    config: ServerConfig,
    clients: HashMap<u32, ClientInfo>,
    enemies: HashMap<u32, EnemyTank>,
    bullets: HashMap<u32, Bullet>,
    next_player_id: u32,
    next_enemy_id: u32,
    next_bullet_id: u32,
    outgoing_sequence: u32,
    snapshot_timer: f32,
    bullet_timer: f32,
    spawn_timer: f32,
    stats_timer: f32,
    decode_failures: u32,
    rng: StdRng,
    clock: fn() -> i64,
    running: bool,
}

impl GameServer {
    /// Binds the server socket and prepares an empty world.
    pub fn bind(config: ServerConfig) -> io::Result<GameServer> {
        let socket = UdpSocket::bind(("0.0.0.0", config.port))?;
        socket.set_nonblocking(true)?;
        info!("server listening on {}", socket.local_addr()?);

        Ok(GameServer {
            socket,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            clients: HashMap::new(),
            enemies: HashMap::new(),
            bullets: HashMap::new(),
            next_player_id: 1,
            next_enemy_id: entities::ENEMY_ID_START,
            next_bullet_id: entities::BULLET_ID_START,
            outgoing_sequence: 0,
            snapshot_timer: 0.0,
            bullet_timer: 0.0,
            spawn_timer: 0.0,
            stats_timer: 0.0,
            decode_failures: 0,
            clock: time::now_ms,
            running: true,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stop(&mut self) {
        if self.running {
            info!("server shutting down");
            self.running = false;
        }
    }

    /// Substitutes the wall clock, for deterministic tests.
    pub fn set_clock(&mut self, clock: fn() -> i64) {
        self.clock = clock;
    }

    /// Number of active players.
    pub fn player_count(&self) -> usize {
        self.clients.values().filter(|c| c.is_active).count()
    }

    pub fn enemy_count(&self) -> usize {
        self.enemies.len()
    }

    pub fn bullet_count(&self) -> usize {
        self.bullets.len()
    }

    pub fn player(&self, player_id: u32) -> Option<&Tank> {
        self.clients.get(&player_id).map(|c| &c.tank)
    }

    pub fn enemies(&self) -> impl Iterator<Item = &EnemyTank> {
        self.enemies.values()
    }

    /// Places an enemy of a given kind, returning its id. The periodic
    /// spawner goes through this as well.
    pub fn spawn_enemy(&mut self, kind: EnemyKind, position: Vec2) -> u32 {
        let id = self.next_enemy_id;
        self.next_enemy_id += 1;
        let enemy = EnemyTank::new(id, kind, position, &mut self.rng);
        info!(
            "spawned {} enemy {} at ({:.0}, {:.0})",
            kind.name(),
            id,
            position.x,
            position.y
        );
        self.enemies.insert(id, enemy);
        id
    }

    /// One full server tick.
    pub fn update(&mut self, dt: f32) {
        if !self.running || dt < 0.0 || !dt.is_finite() {
            return;
        }

        self.process_incoming();
        self.simulate_players(dt);
        self.update_enemies(dt);
        self.update_bullets(dt);
        self.separate_tanks(dt);
        self.check_player_deaths();
        self.update_dead_players(dt);

        self.snapshot_timer += dt;
        if self.snapshot_timer >= self.config.snapshot_interval {
            self.broadcast_game_state();
            self.snapshot_timer = 0.0;
        }

        self.bullet_timer += dt;
        if self.bullet_timer >= self.config.bullet_update_interval {
            self.send_bullet_updates();
            self.bullet_timer = 0.0;
        }

        self.remove_inactive_clients(dt);

        self.stats_timer += dt;
        if self.stats_timer >= 5.0 {
            info!(
                "status: {} players, {} enemies, {} bullets",
                self.player_count(),
                self.enemies.len(),
                self.bullets.len()
            );
            self.stats_timer = 0.0;
        }
    }

    // ---- ingest ----------------------------------------------------------

    fn process_incoming(&mut self) {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        for _ in 0..MAX_MESSAGES_PER_TICK {
            match self.socket.recv_from(&mut buf) {
                Ok((len, addr)) => match Message::decode(&buf[..len]) {
                    Ok(msg) => self.handle_message(msg, addr),
                    Err(e) => {
                        self.decode_failures += 1;
                        if self.decode_failures % 100 == 1 {
                            warn!(
                                "dropping undecodable datagram from {}: {} ({} total)",
                                addr, e, self.decode_failures
                            );
                        }
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("socket receive error: {}", e);
                    break;
                }
            }
        }
    }

    fn handle_message(&mut self, msg: Message, addr: SocketAddr) {
        match msg {
            Message::Join {
                name,
                color,
                timestamp,
                sequence,
            } => self.handle_join(name, color, timestamp, sequence, addr),
            Message::PlayerInput {
                player_id,
                moving_forward,
                moving_backward,
                moving_left,
                moving_right,
                barrel_rotation,
                timestamp,
                sequence,
            } => {
                let flags = MoveFlags {
                    forward: moving_forward,
                    backward: moving_backward,
                    left: moving_left,
                    right: moving_right,
                };
                self.handle_player_input(player_id, flags, barrel_rotation, timestamp, sequence, addr)
            }
            Message::PlayerUpdate {
                player_id,
                x,
                y,
                body_rotation,
                barrel_rotation,
                moving_forward,
                moving_backward,
                moving_left,
                moving_right,
                timestamp,
                sequence,
            } => {
                let flags = MoveFlags {
                    forward: moving_forward,
                    backward: moving_backward,
                    left: moving_left,
                    right: moving_right,
                };
                self.handle_player_update(
                    player_id,
                    Vec2::new(x, y),
                    body_rotation,
                    barrel_rotation,
                    flags,
                    timestamp,
                    sequence,
                    addr,
                )
            }
            Message::BulletSpawn {
                owner_id,
                x,
                y,
                direction_x,
                direction_y,
                timestamp,
                ..
            } => self.handle_bullet_spawn(
                owner_id,
                Vec2::new(x, y),
                Vec2::new(direction_x, direction_y),
                timestamp,
                addr,
            ),
            Message::Ping {
                timestamp,
                sequence,
            } => {
                let now = (self.clock)();
                let reply = Message::Pong {
                    echo_timestamp: timestamp,
                    timestamp: now,
                    sequence,
                };
                self.send_unchecked(&reply, addr);
            }
            _ => {
                debug!("ignoring unexpected message type from {}", addr);
            }
        }
    }

    fn handle_join(
        &mut self,
        name: String,
        color: String,
        timestamp: i64,
        sequence: u32,
        addr: SocketAddr,
    ) {
        if !world::is_valid_player_name(&name) {
            warn!("rejecting join from {}: invalid name ({} bytes)", addr, name.len());
            return;
        }

        let now = (self.clock)();
        if !world::is_valid_timestamp(timestamp, now) {
            warn!(
                "join from {} has a stale timestamp (delta {} ms)",
                addr,
                (now - timestamp).abs()
            );
        }

        // A rejoin from a known address refreshes the session instead of
        // allocating a second player.
        if let Some(existing_id) = self.find_player_by_addr(addr) {
            info!("player {} rejoined from {}", existing_id, addr);
            if let Some(client) = self.clients.get_mut(&existing_id) {
                client.is_active = true;
                client.idle_time = 0.0;
                client.tank.name = name;
                client.sequences.record(sequence);
            }
            self.send_id_assignment(existing_id, addr);
            self.send_game_state_to(existing_id);
            return;
        }

        let parsed_color = match TankColor::parse(&color) {
            Some(c) => c,
            None => {
                if !color.is_empty() {
                    warn!("join from {} asked for unknown color {:?}", addr, color);
                }
                self.assign_color()
            }
        };

        let player_id = self.next_player_id;
        self.next_player_id += 1;

        let tank = Tank::new(
            player_id,
            name.clone(),
            parsed_color,
            Vec2::new(world::CENTER_X, world::CENTER_Y),
        );
        let mut client = ClientInfo::new(addr, tank);
        client.sequences.record(sequence);
        self.clients.insert(player_id, client);

        info!(
            "player {} ({}) joined from {} with color {}",
            player_id,
            name,
            addr,
            parsed_color.as_str()
        );

        self.send_id_assignment(player_id, addr);
        self.send_game_state_to(player_id);
        self.broadcast_game_state();
    }

    fn handle_player_input(
        &mut self,
        player_id: u32,
        flags: MoveFlags,
        barrel_rotation: f32,
        timestamp: i64,
        sequence: u32,
        addr: SocketAddr,
    ) {
        if player_id == 0 || player_id >= entities::ENEMY_ID_START {
            warn!("input with out-of-range player id {}", player_id);
            return;
        }

        let now = (self.clock)();
        if !world::is_valid_timestamp(timestamp, now) {
            debug!(
                "input from player {} has a stale timestamp (delta {} ms)",
                player_id,
                (now - timestamp).abs()
            );
        }
        if !world::is_valid_rotation(barrel_rotation) {
            debug!(
                "input from player {} carries invalid barrel rotation {}",
                player_id, barrel_rotation
            );
        }

        let ack_addr = {
            let client = match self.clients.get_mut(&player_id) {
                Some(c) => c,
                None => return,
            };
            if client.addr != addr {
                warn!("input for player {} from wrong address {}", player_id, addr);
                return;
            }
            if !client.sequences.accept(sequence) {
                debug!(
                    "dropping duplicate/stale input from player {} (seq {})",
                    player_id, sequence
                );
                return;
            }

            client.tank.moving = flags;
            client.tank.set_barrel_rotation(barrel_rotation);
            client.idle_time = 0.0;
            client.last_acked_input = sequence;
            client.addr
        };

        let now = (self.clock)();
        let seq = self.next_sequence();
        let ack = Message::InputAck {
            player_id,
            acked_sequence: sequence,
            timestamp: now,
            sequence: seq,
        };
        self.send_to_client(player_id, ack_addr, &ack.encode());
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_player_update(
        &mut self,
        player_id: u32,
        position: Vec2,
        body_rotation: f32,
        barrel_rotation: f32,
        flags: MoveFlags,
        timestamp: i64,
        sequence: u32,
        addr: SocketAddr,
    ) {
        if player_id == 0 || player_id >= entities::ENEMY_ID_START {
            return;
        }
        if !position.x.is_finite() || !position.y.is_finite() {
            debug!("player update from {} carries a non-finite position", player_id);
            return;
        }
        if !world::is_valid_rotation(body_rotation) || !world::is_valid_rotation(barrel_rotation) {
            debug!("player update from {} carries invalid rotations", player_id);
            return;
        }
        let now = (self.clock)();
        if !world::is_valid_timestamp(timestamp, now) {
            debug!("player update from {} has a stale timestamp", player_id);
        }

        let client = match self.clients.get_mut(&player_id) {
            Some(c) => c,
            None => return,
        };
        if client.addr != addr {
            warn!("player update for {} from wrong address {}", player_id, addr);
            return;
        }
        if !client.sequences.accept(sequence) {
            debug!(
                "dropping duplicate/stale player update from {} (seq {})",
                player_id, sequence
            );
            return;
        }

        client.tank.position = world::clamp_position(position);
        client.tank.set_body_rotation(body_rotation);
        client.tank.set_barrel_rotation(barrel_rotation);
        client.tank.moving = flags;
        client.idle_time = 0.0;
    }

    fn handle_bullet_spawn(
        &mut self,
        owner_id: u32,
        spawn: Vec2,
        direction: Vec2,
        timestamp: i64,
        addr: SocketAddr,
    ) {
        let alive = match self.clients.get(&owner_id) {
            Some(c) if c.addr == addr => c.is_active && !c.tank.is_dead,
            Some(_) => {
                warn!("bullet spawn for player {} from wrong address {}", owner_id, addr);
                return;
            }
            None => {
                warn!("bullet spawn from unknown player {}", owner_id);
                return;
            }
        };
        if !alive {
            debug!("ignoring bullet spawn from dead/inactive player {}", owner_id);
            return;
        }

        if !world::is_inside_playable(spawn) {
            warn!("rejecting bullet spawn from player {}: bad position", owner_id);
            return;
        }
        let dir_len = direction.length();
        if !(0.001..=2.0).contains(&dir_len) {
            warn!("rejecting bullet spawn from player {}: bad direction", owner_id);
            return;
        }
        let now = (self.clock)();
        if !world::is_valid_timestamp(timestamp, now) {
            warn!("rejecting bullet spawn from player {}: stale timestamp", owner_id);
            return;
        }

        let mut bullet = Bullet::new(BulletKind::PlayerStandard, spawn, direction, owner_id);
        let bullet_id = self.next_bullet_id;
        self.next_bullet_id += 1;
        bullet.id = bullet_id;
        self.bullets.insert(bullet_id, bullet);

        debug!("player {} spawned bullet {}", owner_id, bullet_id);
        self.send_bullet_updates();
    }

    // ---- simulation ------------------------------------------------------

    fn simulate_players(&mut self, dt: f32) {
        for client in self.clients.values_mut() {
            if !client.is_active || client.tank.is_dead {
                continue;
            }
            let tank = &mut client.tank;

            if tank.moving.left {
                tank.set_body_rotation(tank.body_rotation() - TANK_ROTATION_SPEED * dt);
            } else if tank.moving.right {
                tank.set_body_rotation(tank.body_rotation() + TANK_ROTATION_SPEED * dt);
            }

            let facing = tank.facing();
            if tank.moving.forward {
                tank.position += facing * TANK_MOVEMENT_SPEED * dt;
            } else if tank.moving.backward {
                tank.position -= facing * TANK_MOVEMENT_SPEED * dt;
            }

            tank.position = world::clamp_position(tank.position);
            tank.tick_cooldown(dt);
        }
    }

    fn update_enemies(&mut self, dt: f32) {
        self.spawn_timer += dt;

        let alive_players = self
            .clients
            .values()
            .filter(|c| c.is_active && !c.tank.is_dead)
            .count();
        let max_enemies = if alive_players > 0 { 3 + alive_players } else { 0 };

        if self.spawn_timer >= self.config.enemy_spawn_interval && self.enemies.len() < max_enemies
        {
            let position = Vec2::new(
                self.rng.gen_range(world::SPAWN_MIN_X..world::SPAWN_MAX_X),
                self.rng.gen_range(world::SPAWN_MIN_Y..world::SPAWN_MAX_Y),
            );
            let kind = self.roll_enemy_kind();
            self.spawn_enemy(kind, position);
            self.spawn_timer = 0.0;
        }

        let enemy_ids: Vec<u32> = self.enemies.keys().copied().collect();
        let mut fired: Vec<u32> = Vec::new();

        for id in enemy_ids {
            self.refresh_enemy_target(id);

            let rng = &mut self.rng;
            if let Some(enemy) = self.enemies.get_mut(&id) {
                let cooldown_before = enemy.shoot_cooldown();
                enemy.update(dt, rng);
                // A cooldown that jumped up mid-tick means the AI fired.
                if enemy.shoot_cooldown() > cooldown_before + 0.5 {
                    fired.push(id);
                }
            }
        }

        for id in fired {
            self.spawn_enemy_bullet(id);
        }

        self.enemies.retain(|id, enemy| {
            if enemy.is_dead() {
                debug!("removing destroyed enemy {}", id);
                false
            } else {
                true
            }
        });
    }

    fn roll_enemy_kind(&mut self) -> EnemyKind {
        match self.rng.gen_range(1..=100) {
            1..=40 => EnemyKind::Red,
            41..=60 => EnemyKind::Black,
            61..=80 => EnemyKind::Purple,
            81..=95 => EnemyKind::Teal,
            _ => EnemyKind::Orange,
        }
    }

    /// Acquires a target for an enemy without one, or refreshes/clears the
    /// held target from the live player table.
    fn refresh_enemy_target(&mut self, enemy_id: u32) {
        let (has_target, target_id, enemy_pos, detection) = match self.enemies.get(&enemy_id) {
            Some(e) => (
                e.has_target(),
                e.target_player_id(),
                e.position,
                e.stats().detection_range,
            ),
            None => return,
        };

        if !has_target {
            if let Some((player_id, position)) = self.select_target(enemy_pos, detection) {
                if let Some(enemy) = self.enemies.get_mut(&enemy_id) {
                    enemy.set_target(player_id, position);
                }
            }
            return;
        }

        let fresh = self
            .clients
            .get(&target_id)
            .filter(|c| c.is_active && !c.tank.is_dead)
            .map(|c| c.tank.position);

        if let Some(enemy) = self.enemies.get_mut(&enemy_id) {
            match fresh {
                // Hysteresis: a held target is only dropped past twice the
                // detection range so tracking does not flicker.
                Some(position) if enemy_pos.distance(position) <= detection * 2.0 => {
                    enemy.set_target(target_id, position);
                }
                _ => enemy.clear_target(),
            }
        }
    }

    /// Scores every live player in detection range by proximity plus a
    /// wounded-target bonus; the highest score wins.
    fn select_target(&self, enemy_pos: Vec2, detection_range: f32) -> Option<(u32, Vec2)> {
        let mut best: Option<(u32, Vec2, f32)> = None;
        for (player_id, client) in &self.clients {
            if !client.is_active || client.tank.is_dead {
                continue;
            }
            let position = client.tank.position;
            let distance = enemy_pos.distance(position);
            if distance > detection_range {
                continue;
            }
            let proximity = 1.0 - distance / detection_range;
            let wounded = 1.0 - client.tank.health() / client.tank.max_health();
            let score = proximity * 100.0 + wounded * 20.0;
            if best.map_or(true, |(_, _, s)| score > s) {
                best = Some((*player_id, position, score));
            }
        }
        best.map(|(id, position, _)| (id, position))
    }

    fn spawn_enemy_bullet(&mut self, enemy_id: u32) {
        let (spawn, direction) = {
            let rng = &mut self.rng;
            let enemy = match self.enemies.get(&enemy_id) {
                Some(e) => e,
                None => return,
            };
            let direction = enemy.apply_accuracy_spread(enemy.aim_direction(), rng);
            (enemy.barrel_end(), direction)
        };

        let mut bullet = Bullet::new(BulletKind::EnemyStandard, spawn, direction, enemy_id);
        let bullet_id = self.next_bullet_id;
        self.next_bullet_id += 1;
        bullet.id = bullet_id;
        let rotation = bullet.rotation;
        self.bullets.insert(bullet_id, bullet);

        let now = (self.clock)();
        let seq = self.next_sequence();
        let msg = Message::BulletSpawn {
            owner_id: enemy_id,
            x: spawn.x,
            y: spawn.y,
            direction_x: direction.x,
            direction_y: direction.y,
            barrel_rotation: rotation,
            timestamp: now,
            sequence: seq,
        };
        self.broadcast(&msg);
    }

    fn update_bullets(&mut self, dt: f32) {
        for bullet in self.bullets.values_mut() {
            bullet.step(dt);
        }
        self.check_bullet_collisions();
        self.remove_dead_bullets();
    }

    fn check_bullet_collisions(&mut self) {
        let mut events: Vec<(u32, DestroyReason, u32, Vec2)> = Vec::new();

        {
            let GameServer {
                bullets,
                enemies,
                clients,
                ..
            } = self;

            for (bullet_id, bullet) in bullets.iter_mut() {
                if bullet.is_destroyed() {
                    continue;
                }

                // Owner ids partition the world: player bullets hurt
                // enemies, enemy bullets hurt players.
                if entities::is_enemy_id(bullet.owner_id) {
                    for (player_id, client) in clients.iter_mut() {
                        if !client.is_active || client.tank.is_dead {
                            continue;
                        }
                        if entities::circles_overlap(
                            bullet.position,
                            bullet.radius,
                            client.tank.position,
                            world::TANK_RADIUS,
                        ) {
                            client.tank.take_damage(bullet.damage);
                            info!(
                                "enemy bullet {} hit player {} for {} (health {})",
                                bullet_id,
                                player_id,
                                bullet.damage,
                                client.tank.health()
                            );
                            bullet.destroy();
                            events.push((
                                *bullet_id,
                                DestroyReason::HitPlayer,
                                *player_id,
                                bullet.position,
                            ));
                            break;
                        }
                    }
                } else {
                    for (enemy_id, enemy) in enemies.iter_mut() {
                        if enemy.is_dead() {
                            continue;
                        }
                        if entities::circles_overlap(
                            bullet.position,
                            bullet.radius,
                            enemy.position,
                            enemy.radius(),
                        ) {
                            enemy.take_damage(bullet.damage);
                            if enemy.is_dead() {
                                if let Some(owner) = clients.get_mut(&bullet.owner_id) {
                                    owner.tank.score += enemy.score_value();
                                    info!(
                                        "player {} destroyed enemy {} (+{}, total {})",
                                        bullet.owner_id,
                                        enemy_id,
                                        enemy.score_value(),
                                        owner.tank.score
                                    );
                                }
                            }
                            bullet.destroy();
                            events.push((
                                *bullet_id,
                                DestroyReason::HitEnemy,
                                *enemy_id,
                                bullet.position,
                            ));
                            break;
                        }
                    }
                }

                if bullet.is_destroyed() {
                    continue;
                }

                // The playable border is lethal, including an exact touch.
                let p = bullet.position;
                if p.x <= world::PLAYABLE_MIN_X
                    || p.x >= world::PLAYABLE_MAX_X
                    || p.y <= world::PLAYABLE_MIN_Y
                    || p.y >= world::PLAYABLE_MAX_Y
                {
                    bullet.destroy();
                    events.push((*bullet_id, DestroyReason::HitBorder, 0, p));
                }
            }
        }

        for (bullet_id, reason, target, position) in events {
            self.broadcast_bullet_destroy(bullet_id, reason, target, position);
        }
    }

    fn remove_dead_bullets(&mut self) {
        let expired: Vec<(u32, bool, Vec2)> = self
            .bullets
            .iter()
            .filter(|(_, b)| b.is_expired())
            .map(|(id, b)| (*id, b.is_destroyed(), b.position))
            .collect();

        for (bullet_id, destroyed_by_collision, position) in expired {
            self.bullets.remove(&bullet_id);
            // Collisions already announced their own destruction.
            if !destroyed_by_collision {
                self.broadcast_bullet_destroy(bullet_id, DestroyReason::Expired, 0, position);
            }
        }
    }

    /// Pushes overlapping tanks apart with a speed-bounded positional
    /// correction, then clamps everyone back into the movement rectangle.
    fn separate_tanks(&mut self, dt: f32) {
        let max_push = SEPARATION_SPEED * dt;

        // Players vs enemies: the player yields.
        {
            let GameServer {
                clients, enemies, ..
            } = self;
            for client in clients.values_mut() {
                if !client.is_active {
                    continue;
                }
                for enemy in enemies.values() {
                    if enemy.is_dead() {
                        continue;
                    }
                    let min_dist = world::TANK_RADIUS + enemy.radius() + MIN_SEPARATION;
                    let delta = client.tank.position - enemy.position;
                    let dist_sq = delta.length_squared();
                    if dist_sq >= min_dist * min_dist {
                        continue;
                    }
                    let dist = dist_sq.sqrt();
                    if dist < 0.001 {
                        client.tank.position.x += min_dist;
                    } else {
                        let overlap = min_dist - dist;
                        let push = overlap.min(max_push);
                        client.tank.position += (delta / dist) * push;
                    }
                    client.tank.position = world::clamp_position(client.tank.position);
                }
            }
        }

        // Players vs players: both yield half.
        let ids: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, c)| c.is_active)
            .map(|(id, _)| *id)
            .collect();

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (pos_a, pos_b) = match (self.clients.get(&ids[i]), self.clients.get(&ids[j])) {
                    (Some(a), Some(b)) => (a.tank.position, b.tank.position),
                    _ => continue,
                };
                let min_dist = world::TANK_RADIUS * 2.0 + MIN_SEPARATION;
                let delta = pos_b - pos_a;
                let dist_sq = delta.length_squared();
                if dist_sq >= min_dist * min_dist {
                    continue;
                }
                let dist = dist_sq.sqrt();

                let (shift_a, shift_b) = if dist < 0.001 {
                    (
                        Vec2::new(-min_dist / 2.0, 0.0),
                        Vec2::new(min_dist / 2.0, 0.0),
                    )
                } else {
                    let overlap = min_dist - dist;
                    let push = (overlap / 2.0).min(max_push / 2.0);
                    let dir = delta / dist;
                    (-dir * push, dir * push)
                };

                if let Some(a) = self.clients.get_mut(&ids[i]) {
                    a.tank.position = world::clamp_position(a.tank.position + shift_a);
                }
                if let Some(b) = self.clients.get_mut(&ids[j]) {
                    b.tank.position = world::clamp_position(b.tank.position + shift_b);
                }
            }
        }
    }

    // ---- death & respawn -------------------------------------------------

    fn check_player_deaths(&mut self) {
        let dead: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, c)| c.is_active && !c.tank.is_dead && c.tank.is_health_depleted())
            .map(|(id, _)| *id)
            .collect();
        for player_id in dead {
            self.handle_player_death(player_id);
        }
    }

    fn handle_player_death(&mut self, player_id: u32) {
        let (position, penalty) = {
            let client = match self.clients.get_mut(&player_id) {
                Some(c) => c,
                None => return,
            };
            client.tank.is_dead = true;
            client.tank.respawn_timer = RESPAWN_COOLDOWN;
            client.tank.set_health(0.0);

            let old_score = client.tank.score;
            client.tank.score = (client.tank.score - DEATH_PENALTY).max(0);
            let penalty = old_score - client.tank.score;

            info!(
                "player {} ({}) died, -{} points (score {})",
                player_id, client.tank.name, penalty, client.tank.score
            );
            (client.tank.position, penalty)
        };

        let now = (self.clock)();
        let seq = self.next_sequence();
        let msg = Message::PlayerDeath {
            player_id,
            killer_id: 0,
            x: position.x,
            y: position.y,
            score_penalty: penalty,
            timestamp: now,
            sequence: seq,
        };
        self.broadcast(&msg);
    }

    fn update_dead_players(&mut self, dt: f32) {
        let mut ready: Vec<u32> = Vec::new();
        for (player_id, client) in self.clients.iter_mut() {
            if !client.is_active || !client.tank.is_dead {
                continue;
            }
            client.tank.respawn_timer -= dt;
            if client.tank.respawn_timer <= 0.0 {
                ready.push(*player_id);
            }
        }
        for player_id in ready {
            self.respawn_player(player_id);
        }
    }

    fn respawn_player(&mut self, player_id: u32) {
        let spawn = self.find_respawn_position();

        let health = {
            let client = match self.clients.get_mut(&player_id) {
                Some(c) => c,
                None => return,
            };
            client.tank.is_dead = false;
            client.tank.respawn_timer = 0.0;
            let max = client.tank.max_health();
            client.tank.set_health(max);
            client.tank.position = spawn;
            client.tank.set_body_rotation(0.0);
            client.tank.set_barrel_rotation(0.0);
            client.tank.moving = MoveFlags::default();
            info!(
                "player {} respawned at ({:.0}, {:.0})",
                player_id, spawn.x, spawn.y
            );
            client.tank.health()
        };

        let now = (self.clock)();
        let seq = self.next_sequence();
        let msg = Message::PlayerRespawn {
            player_id,
            x: spawn.x,
            y: spawn.y,
            health,
            timestamp: now,
            sequence: seq,
        };
        self.broadcast(&msg);
    }

    /// Random position at least 200 units away from every enemy and live
    /// player; falls back to the world center after ten attempts.
    fn find_respawn_position(&mut self) -> Vec2 {
        let min_x = world::PLAYABLE_MIN_X + world::TANK_RADIUS + 50.0;
        let max_x = world::PLAYABLE_MAX_X - world::TANK_RADIUS - 50.0;
        let min_y = world::PLAYABLE_MIN_Y + world::TANK_RADIUS + 50.0;
        let max_y = world::PLAYABLE_MAX_Y - world::TANK_RADIUS - 50.0;
        let clearance_sq = MIN_RESPAWN_CLEARANCE * MIN_RESPAWN_CLEARANCE;

        for _ in 0..MAX_RESPAWN_ATTEMPTS {
            let candidate = Vec2::new(
                self.rng.gen_range(min_x..max_x),
                self.rng.gen_range(min_y..max_y),
            );

            let near_enemy = self
                .enemies
                .values()
                .filter(|e| !e.is_dead())
                .any(|e| candidate.distance_squared(e.position) < clearance_sq);
            if near_enemy {
                continue;
            }

            let near_player = self
                .clients
                .values()
                .filter(|c| c.is_active && !c.tank.is_dead)
                .any(|c| candidate.distance_squared(c.tank.position) < clearance_sq);
            if near_player {
                continue;
            }

            return candidate;
        }

        debug!("no clear respawn position found, using world center");
        Vec2::new(world::CENTER_X, world::CENTER_Y)
    }

    // ---- broadcast & bookkeeping ----------------------------------------

    fn player_snapshot(&self) -> Vec<PlayerData> {
        self.clients
            .values()
            .filter(|c| c.is_active)
            .map(|c| {
                let t = &c.tank;
                PlayerData {
                    player_id: t.id,
                    name: t.name.clone(),
                    x: t.position.x,
                    y: t.position.y,
                    body_rotation: t.body_rotation(),
                    barrel_rotation: t.barrel_rotation(),
                    color: t.color.as_str().to_string(),
                    moving_forward: t.moving.forward,
                    moving_backward: t.moving.backward,
                    moving_left: t.moving.left,
                    moving_right: t.moving.right,
                    health: t.health(),
                    max_health: t.max_health(),
                    score: t.score,
                    is_dead: t.is_dead,
                }
            })
            .collect()
    }

    fn enemy_snapshot(&self) -> Vec<EnemyData> {
        self.enemies
            .values()
            .map(|e| EnemyData {
                enemy_id: e.id,
                kind: e.kind,
                x: e.position.x,
                y: e.position.y,
                body_rotation: e.body_rotation(),
                barrel_rotation: e.barrel_rotation(),
                health: e.health(),
                max_health: e.max_health(),
            })
            .collect()
    }

    fn broadcast_game_state(&mut self) {
        if self.clients.is_empty() {
            return;
        }

        let players = self.player_snapshot();
        let enemies = self.enemy_snapshot();

        let targets: Vec<(u32, SocketAddr, u32)> = self
            .clients
            .iter()
            .filter(|(_, c)| c.is_active)
            .map(|(id, c)| (*id, c.addr, c.last_acked_input))
            .collect();

        let now = (self.clock)();
        for (player_id, addr, last_acked) in targets {
            let seq = self.next_sequence();
            let msg = Message::GameState {
                players: players.clone(),
                enemies: enemies.clone(),
                last_acked_input: last_acked,
                timestamp: now,
                sequence: seq,
            };
            self.send_to_client(player_id, addr, &msg.encode());
        }
    }

    fn send_game_state_to(&mut self, player_id: u32) {
        let (addr, last_acked) = match self.clients.get(&player_id) {
            Some(c) if c.is_active => (c.addr, c.last_acked_input),
            _ => return,
        };

        let now = (self.clock)();
        let seq = self.next_sequence();
        let msg = Message::GameState {
            players: self.player_snapshot(),
            enemies: self.enemy_snapshot(),
            last_acked_input: last_acked,
            timestamp: now,
            sequence: seq,
        };
        self.send_to_client(player_id, addr, &msg.encode());
    }

    fn send_bullet_updates(&mut self) {
        if self.bullets.is_empty() || self.clients.is_empty() {
            return;
        }

        let now = (self.clock)();
        let bullets: Vec<BulletData> = self
            .bullets
            .values()
            .filter(|b| !b.is_destroyed())
            .map(|b| BulletData {
                bullet_id: b.id,
                owner_id: b.owner_id,
                kind: b.kind,
                x: b.position.x,
                y: b.position.y,
                velocity_x: b.velocity.x,
                velocity_y: b.velocity.y,
                rotation: b.rotation,
                damage: b.damage,
                lifetime: b.lifetime,
                spawn_time: now,
            })
            .collect();

        let seq = self.next_sequence();
        let msg = Message::BulletUpdate {
            bullets,
            timestamp: now,
            sequence: seq,
        };
        self.broadcast(&msg);
    }

    fn broadcast_bullet_destroy(
        &mut self,
        bullet_id: u32,
        reason: DestroyReason,
        hit_target_id: u32,
        position: Vec2,
    ) {
        let now = (self.clock)();
        let seq = self.next_sequence();
        let msg = Message::BulletDestroy {
            bullet_id,
            reason,
            hit_target_id,
            x: position.x,
            y: position.y,
            timestamp: now,
            sequence: seq,
        };
        self.broadcast(&msg);
    }

    fn remove_inactive_clients(&mut self, dt: f32) {
        let mut dropped: Vec<u32> = Vec::new();
        for (player_id, client) in self.clients.iter_mut() {
            if !client.is_active {
                dropped.push(*player_id);
                continue;
            }
            client.idle_time += dt;
            if client.idle_time > self.config.idle_timeout {
                warn!(
                    "player {} ({}) timed out after {:.0}s of silence",
                    player_id, client.tank.name, client.idle_time
                );
                client.is_active = false;
                dropped.push(*player_id);
            }
        }

        if dropped.is_empty() {
            return;
        }
        for player_id in dropped {
            self.clients.remove(&player_id);
        }
        // The survivors learn about the departure from the next snapshot.
        self.broadcast_game_state();
    }

    fn find_player_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, c)| c.addr == addr)
            .map(|(id, _)| *id)
    }

    /// First color nobody uses, or a random one once all four are taken.
    fn assign_color(&mut self) -> TankColor {
        for color in TankColor::ALL {
            if !self.clients.values().any(|c| c.tank.color == color) {
                return color;
            }
        }
        TankColor::ALL[self.rng.gen_range(0..TankColor::ALL.len())]
    }

    fn send_id_assignment(&mut self, player_id: u32, addr: SocketAddr) {
        let now = (self.clock)();
        let seq = self.next_sequence();
        let msg = Message::IdAssign {
            player_id,
            timestamp: now,
            sequence: seq,
        };
        self.send_to_client(player_id, addr, &msg.encode());
    }

    fn next_sequence(&mut self) -> u32 {
        let seq = self.outgoing_sequence;
        self.outgoing_sequence = self.outgoing_sequence.wrapping_add(1);
        seq
    }

    fn broadcast(&mut self, msg: &Message) {
        let bytes = msg.encode();
        let targets: Vec<(u32, SocketAddr)> = self
            .clients
            .iter()
            .filter(|(_, c)| c.is_active)
            .map(|(id, c)| (*id, c.addr))
            .collect();
        for (player_id, addr) in targets {
            self.send_to_client(player_id, addr, &bytes);
        }
    }

    /// Sends to a known client and maintains its consecutive-error counter.
    fn send_to_client(&mut self, player_id: u32, addr: SocketAddr, bytes: &[u8]) {
        match self.socket.send_to(bytes, addr) {
            Ok(_) => {
                if let Some(client) = self.clients.get_mut(&player_id) {
                    client.consecutive_errors = 0;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                if let Some(client) = self.clients.get_mut(&player_id) {
                    client.consecutive_errors += 1;
                    warn!(
                        "send to player {} failed ({} consecutive): {}",
                        player_id, client.consecutive_errors, e
                    );
                    if client.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        warn!("player {} marked lost after repeated send failures", player_id);
                        client.is_active = false;
                    }
                }
            }
        }
    }

    /// Fire-and-forget reply to an address with no client record (pongs).
    fn send_unchecked(&self, msg: &Message, addr: SocketAddr) {
        match self.socket.send_to(&msg.encode(), addr) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => debug!("reply to {} failed: {}", addr, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_server() -> GameServer {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        GameServer::bind(config).expect("bind test server")
    }

    fn join(server: &mut GameServer, addr: SocketAddr, name: &str) -> u32 {
        server.handle_join(
            name.to_string(),
            "blue".to_string(),
            time::now_ms(),
            1,
            addr,
        );
        server.find_player_by_addr(addr).expect("player exists")
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn join_creates_player_at_center() {
        let mut server = test_server();
        let id = join(&mut server, addr(40001), "Ada");
        let tank = server.player(id).unwrap();
        assert_eq!(tank.position, Vec2::new(world::CENTER_X, world::CENTER_Y));
        assert_eq!(tank.health(), 100.0);
        assert_eq!(tank.score, 0);
        assert!(!tank.is_dead);
    }

    #[test]
    fn join_with_bad_name_is_rejected() {
        let mut server = test_server();
        server.handle_join(String::new(), "red".into(), time::now_ms(), 1, addr(40002));
        assert_eq!(server.player_count(), 0);
        server.handle_join("x".repeat(51), "red".into(), time::now_ms(), 1, addr(40002));
        assert_eq!(server.player_count(), 0);
    }

    #[test]
    fn rejoin_from_same_address_keeps_one_player() {
        let mut server = test_server();
        let a = addr(40003);
        let first = join(&mut server, a, "Ada");
        let second = join(&mut server, a, "Ada2");
        assert_eq!(first, second);
        assert_eq!(server.player_count(), 1);
        assert_eq!(server.player(first).unwrap().name, "Ada2");
    }

    #[test]
    fn unknown_color_falls_back_to_unused_color() {
        let mut server = test_server();
        server.handle_join("Ada".into(), "magenta".into(), time::now_ms(), 1, addr(40004));
        let id = server.find_player_by_addr(addr(40004)).unwrap();
        assert_eq!(server.player(id).unwrap().color, TankColor::Red);
    }

    #[test]
    fn input_moves_player_forward_along_facing() {
        let mut server = test_server();
        let a = addr(40005);
        let id = join(&mut server, a, "Ada");

        let flags = MoveFlags {
            forward: true,
            ..MoveFlags::default()
        };
        server.handle_player_input(id, flags, 0.0, time::now_ms(), 7, a);
        assert_eq!(server.clients[&id].last_acked_input, 7);

        let x_before = server.player(id).unwrap().position.x;
        server.simulate_players(1.0 / 60.0);
        let tank = server.player(id).unwrap();
        let expected = x_before + TANK_MOVEMENT_SPEED / 60.0;
        assert!((tank.position.x - expected).abs() < 1e-3);
    }

    #[test]
    fn duplicate_input_is_dropped() {
        let mut server = test_server();
        let a = addr(40006);
        let id = join(&mut server, a, "Ada");

        let forward = MoveFlags {
            forward: true,
            ..MoveFlags::default()
        };
        server.handle_player_input(id, forward, 0.0, time::now_ms(), 5, a);
        // A replay of sequence 5 flips every flag off; it must be ignored.
        server.handle_player_input(id, MoveFlags::default(), 0.0, time::now_ms(), 5, a);
        assert!(server.player(id).unwrap().moving.forward);
    }

    #[test]
    fn input_from_wrong_address_is_ignored() {
        let mut server = test_server();
        let a = addr(40007);
        let id = join(&mut server, a, "Ada");
        let forward = MoveFlags {
            forward: true,
            ..MoveFlags::default()
        };
        server.handle_player_input(id, forward, 0.0, time::now_ms(), 2, addr(40999));
        assert!(!server.player(id).unwrap().moving.forward);
    }

    #[test]
    fn tank_stops_exactly_on_movement_boundary() {
        let mut server = test_server();
        let a = addr(40008);
        let id = join(&mut server, a, "Ada");
        server.clients.get_mut(&id).unwrap().tank.moving.forward = true;

        // Facing +x by default; drive long enough to cross the world.
        for _ in 0..1000 {
            server.simulate_players(0.016);
        }
        let tank = server.player(id).unwrap();
        assert_eq!(tank.position.x, world::MOVEMENT_MAX_X);
    }

    #[test]
    fn enemy_cap_follows_player_count() {
        let mut server = test_server();
        // No players: no spawns even after the interval elapses.
        server.update_enemies(10.0);
        assert_eq!(server.enemy_count(), 0);

        join(&mut server, addr(40009), "Ada");
        // One alive player: cap is four; each elapsed interval spawns one.
        for _ in 0..20 {
            server.update_enemies(5.0);
        }
        assert_eq!(server.enemy_count(), 4);
    }

    #[test]
    fn player_bullet_kills_enemy_and_awards_score() {
        let mut server = test_server();
        let a = addr(40010);
        let id = join(&mut server, a, "Ada");

        let enemy_pos = Vec2::new(300.0, 300.0);
        let enemy_id = server.spawn_enemy(EnemyKind::Red, enemy_pos);

        // Four standard hits at 25 damage apiece.
        for _ in 0..4 {
            let mut bullet = Bullet::new(BulletKind::PlayerStandard, enemy_pos, Vec2::X, id);
            let bullet_id = server.next_bullet_id;
            server.next_bullet_id += 1;
            bullet.id = bullet_id;
            server.bullets.insert(bullet_id, bullet);
            server.check_bullet_collisions();
        }

        assert!(server.enemies[&enemy_id].is_dead());
        assert_eq!(server.player(id).unwrap().score, 10);
    }

    #[test]
    fn enemy_bullet_damages_and_kills_player() {
        let mut server = test_server();
        let a = addr(40011);
        let id = join(&mut server, a, "Ada");
        let player_pos = server.player(id).unwrap().position;

        // 100 health / 20 damage per enemy standard round = five hits.
        for hit in 1..=5 {
            let mut bullet = Bullet::new(
                BulletKind::EnemyStandard,
                player_pos,
                Vec2::X,
                entities::ENEMY_ID_START,
            );
            let bullet_id = server.next_bullet_id;
            server.next_bullet_id += 1;
            bullet.id = bullet_id;
            server.bullets.insert(bullet_id, bullet);
            server.check_bullet_collisions();
            let expected = 100.0 - 20.0 * hit as f32;
            assert_eq!(server.player(id).unwrap().health(), expected);
        }

        server.check_player_deaths();
        let tank = server.player(id).unwrap();
        assert!(tank.is_dead);
        assert_eq!(tank.score, 0); // penalty floored at zero
        assert_eq!(tank.respawn_timer, RESPAWN_COOLDOWN);
    }

    #[test]
    fn respawn_happens_after_cooldown_with_full_health() {
        let mut server = test_server();
        let a = addr(40012);
        let id = join(&mut server, a, "Ada");
        server.clients.get_mut(&id).unwrap().tank.set_health(0.0);
        server.check_player_deaths();
        assert!(server.player(id).unwrap().is_dead);

        // 4.9 seconds in: still dead.
        for _ in 0..49 {
            server.update_dead_players(0.1);
        }
        assert!(server.player(id).unwrap().is_dead);

        server.update_dead_players(0.2);
        let tank = server.player(id).unwrap();
        assert!(!tank.is_dead);
        assert_eq!(tank.health(), tank.max_health());
    }

    #[test]
    fn respawn_position_keeps_clearance_from_enemies() {
        let mut server = test_server();
        join(&mut server, addr(40013), "Ada");
        let enemy_id = server.spawn_enemy(EnemyKind::Black, Vec2::new(640.0, 480.0));
        let enemy_pos = server.enemies[&enemy_id].position;

        for _ in 0..20 {
            let spawn = server.find_respawn_position();
            let clear = spawn.distance(enemy_pos) >= MIN_RESPAWN_CLEARANCE
                || spawn == Vec2::new(world::CENTER_X, world::CENTER_Y);
            assert!(clear, "respawn {} too close to enemy", spawn);
        }
    }

    #[test]
    fn bullet_on_playable_edge_is_destroyed() {
        let mut server = test_server();
        let mut bullet = Bullet::new(
            BulletKind::PlayerStandard,
            Vec2::new(world::PLAYABLE_MIN_X, 480.0),
            Vec2::X,
            1,
        );
        bullet.id = entities::BULLET_ID_START;
        server.bullets.insert(bullet.id, bullet);
        server.check_bullet_collisions();
        assert!(server.bullets[&entities::BULLET_ID_START].is_destroyed());
    }

    #[test]
    fn expired_bullets_are_reaped() {
        let mut server = test_server();
        let mut bullet = Bullet::new(BulletKind::Tracer, Vec2::new(640.0, 480.0), Vec2::X, 1);
        bullet.id = entities::BULLET_ID_START;
        bullet.lifetime = -0.1;
        server.bullets.insert(bullet.id, bullet);
        server.remove_dead_bullets();
        assert_eq!(server.bullet_count(), 0);
    }

    #[test]
    fn idle_clients_are_reaped_after_timeout() {
        let mut server = test_server();
        join(&mut server, addr(40014), "Ada");
        assert_eq!(server.player_count(), 1);

        server.remove_inactive_clients(14.9);
        assert_eq!(server.player_count(), 1);
        server.remove_inactive_clients(0.2);
        assert_eq!(server.player_count(), 0);
    }

    #[test]
    fn separation_pushes_overlapping_players_apart() {
        let mut server = test_server();
        let id1 = join(&mut server, addr(40015), "Ada");
        let id2 = join(&mut server, addr(40016), "Grace");
        server.clients.get_mut(&id1).unwrap().tank.position = Vec2::new(640.0, 480.0);
        server.clients.get_mut(&id2).unwrap().tank.position = Vec2::new(645.0, 480.0);

        for _ in 0..300 {
            server.separate_tanks(0.016);
        }

        let p1 = server.player(id1).unwrap().position;
        let p2 = server.player(id2).unwrap().position;
        assert!(p1.distance(p2) >= world::TANK_RADIUS * 2.0);
    }

    #[test]
    fn snapshot_fields_respect_invariants() {
        let mut server = test_server();
        let id = join(&mut server, addr(40017), "Ada");
        server
            .clients
            .get_mut(&id)
            .unwrap()
            .tank
            .set_body_rotation(725.0);
        server.spawn_enemy(EnemyKind::Teal, Vec2::new(200.0, 200.0));

        for p in server.player_snapshot() {
            assert!((0.0..360.0).contains(&p.body_rotation));
            assert!(world::is_valid_position(p.x, p.y));
            assert!(p.max_health > 0.0);
            assert!((0.0..=p.max_health).contains(&p.health));
        }
        for e in server.enemy_snapshot() {
            assert!(e.enemy_id >= entities::ENEMY_ID_START);
            assert!(e.max_health > 0.0);
        }
    }
}
