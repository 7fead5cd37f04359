//! Client network runtime: socket, session, and the per-tick pump.
//!
//! [`Client`] owns a non-blocking UDP socket and a [`ClientGame`]. The host
//! calls [`Client::update`] once per frame with the latest input sample;
//! one call drains incoming datagrams, sends the input with prediction,
//! runs reconciliation, and advances the interpolation clock. Connection
//! health is judged by server silence and consecutive socket errors only.

use crate::game::{ClientGame, InputSample};
use glam::Vec2;
use log::{debug, error, info, warn};
use shared::entities::TankColor;
use shared::protocol::{Message, MAX_DATAGRAM_SIZE};
use shared::time;
use shared::tracking::{NetworkStats, SequenceValidator, PING_INTERVAL};
use shared::world;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Datagrams drained per tick.
const MAX_MESSAGES_PER_TICK: usize = 100;

/// Consecutive socket errors before the connection is declared dead.
const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Seconds of server silence before the connection is declared dead.
const SERVER_SILENCE_TIMEOUT: f32 = 15.0;

/// Client-side connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// IPv4 literal or "localhost".
    pub server_ip: String,
    pub server_port: u16,
    pub player_name: String,
    pub preferred_color: TankColor,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_ip: "127.0.0.1".to_string(),
            server_port: 53000,
            player_name: "player".to_string(),
            preferred_color: TankColor::Green,
        }
    }
}

impl ClientConfig {
    /// Resolves the configured address. Only "localhost" and IPv4 literals
    /// are accepted.
    pub fn server_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        let ip: Ipv4Addr = if self.server_ip == "localhost" {
            Ipv4Addr::LOCALHOST
        } else {
            self.server_ip.parse()?
        };
        Ok(SocketAddr::new(IpAddr::V4(ip), self.server_port))
    }
}

/// The client node: session state plus the world in [`ClientGame`].
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    config: ClientConfig,
    pub game: ClientGame,
    connected: bool,
    outgoing_sequence: u32,
    sequences: SequenceValidator,
    stats: NetworkStats,
    ping_timer: f32,
    time_since_server: f32,
    consecutive_errors: u32,
    clock: fn() -> i64,
}

impl Client {
    /// Binds an ephemeral socket and sends the join request. The session
    /// counts as connected once the server assigns an id.
    pub fn connect(config: ClientConfig) -> io::Result<Client> {
        if !world::is_valid_player_name(&config.player_name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "player name must be 1-50 printable ASCII characters",
            ));
        }
        let server_addr = config
            .server_addr()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;

        let game = ClientGame::new(config.player_name.clone(), config.preferred_color);
        let mut client = Client {
            socket,
            server_addr,
            config,
            game,
            connected: false,
            outgoing_sequence: 0,
            sequences: SequenceValidator::new(),
            stats: NetworkStats::new(),
            ping_timer: 0.0,
            time_since_server: 0.0,
            consecutive_errors: 0,
            clock: time::now_ms,
        };

        info!("joining {} as {:?}", server_addr, client.config.player_name);
        client.send_join();
        Ok(client)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn local_player_id(&self) -> u32 {
        self.game.local_player_id()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn set_clock(&mut self, clock: fn() -> i64) {
        self.clock = clock;
        self.game.prediction.set_clock(clock);
    }

    /// One client tick: receive, send input with prediction, reconcile,
    /// advance interpolation, and watch connection health.
    pub fn update(&mut self, dt: f32, input: Option<&InputSample>) {
        if dt < 0.0 || !dt.is_finite() {
            return;
        }

        self.receive_messages();

        self.ping_timer += dt;
        if self.ping_timer >= PING_INTERVAL.as_secs_f32() {
            if self.connected {
                self.send_ping();
            } else {
                // The join datagram may have been lost; keep knocking.
                self.send_join();
            }
            self.ping_timer = 0.0;
        }

        if self.connected && !self.game.local_tank.is_dead {
            if let Some(sample) = input {
                let now = (self.clock)();
                let frame = self.game.predict_input(sample, now, dt);
                let msg = Message::PlayerInput {
                    player_id: self.game.local_player_id(),
                    moving_forward: frame.moving.forward,
                    moving_backward: frame.moving.backward,
                    moving_left: frame.moving.left,
                    moving_right: frame.moving.right,
                    barrel_rotation: frame.barrel_rotation,
                    timestamp: frame.timestamp,
                    sequence: frame.sequence,
                };
                self.send_message(&msg);
                self.stats.record_sent(frame.sequence, now);

                if sample.fire {
                    self.try_send_shot();
                }
            }
        }

        self.game.local_tank.tick_cooldown(dt);
        self.game.reconcile(dt);
        self.game.interpolation.update(dt);
        self.game.step_bullets(dt);
        self.game.prediction.update_buffer_timers(dt);
        self.game.prediction.cleanup_timed_out_inputs();

        self.time_since_server += dt;
        if self.connected && self.time_since_server > SERVER_SILENCE_TIMEOUT {
            warn!("no server traffic for {:.0}s, disconnecting", self.time_since_server);
            self.connected = false;
        }
    }

    /// Sends the legacy full-state update (tag 3). Kept for compatibility
    /// with hosts that do not run prediction; the input path is preferred.
    pub fn send_legacy_update(&mut self) {
        if !self.connected {
            return;
        }
        let now = (self.clock)();
        let seq = self.next_sequence();
        let tank = &self.game.local_tank;
        let msg = Message::PlayerUpdate {
            player_id: tank.id,
            x: tank.position.x,
            y: tank.position.y,
            body_rotation: tank.body_rotation(),
            barrel_rotation: tank.barrel_rotation(),
            moving_forward: tank.moving.forward,
            moving_backward: tank.moving.backward,
            moving_left: tank.moving.left,
            moving_right: tank.moving.right,
            timestamp: now,
            sequence: seq,
        };
        self.send_message(&msg);
    }

    /// Fires if the local cooldown allows: spawns the ghost bullet and asks
    /// the server for the real one.
    fn try_send_shot(&mut self) {
        if let Some((spawn, direction)) = self.game.try_fire() {
            let now = (self.clock)();
            let seq = self.next_sequence();
            let msg = Message::BulletSpawn {
                owner_id: self.game.local_player_id(),
                x: spawn.x,
                y: spawn.y,
                direction_x: direction.x,
                direction_y: direction.y,
                barrel_rotation: self.game.local_tank.barrel_rotation(),
                timestamp: now,
                sequence: seq,
            };
            self.send_message(&msg);
        }
    }

    fn receive_messages(&mut self) {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        for _ in 0..MAX_MESSAGES_PER_TICK {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    if from != self.server_addr {
                        debug!("dropping datagram from unexpected sender {}", from);
                        continue;
                    }
                    match Message::decode(&buf[..len]) {
                        Ok(msg) => {
                            self.consecutive_errors = 0;
                            self.time_since_server = 0.0;
                            self.stats.record_received();
                            self.handle_message(msg);
                        }
                        Err(e) => warn!("dropping undecodable server datagram: {}", e),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.consecutive_errors += 1;
                    error!(
                        "socket receive error ({} consecutive): {}",
                        self.consecutive_errors, e
                    );
                    if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        warn!("connection lost after repeated socket errors");
                        self.connected = false;
                    }
                    break;
                }
            }
        }
    }

    fn handle_message(&mut self, msg: Message) {
        // The server's stream carries its own sequence space; drop
        // duplicates and ancient stragglers.
        if !self.sequences.accept(msg.sequence()) {
            debug!("dropping duplicate/stale server message (seq {})", msg.sequence());
            return;
        }

        match msg {
            Message::IdAssign { player_id, .. } => {
                info!("connected, assigned player id {}", player_id);
                self.game.set_local_player_id(player_id);
                self.connected = true;
            }
            Message::GameState {
                players,
                enemies,
                last_acked_input,
                timestamp,
                ..
            } => {
                self.game
                    .apply_game_state(players, enemies, last_acked_input, timestamp);
            }
            Message::InputAck {
                acked_sequence, ..
            } => {
                self.game.acknowledge_input(acked_sequence);
            }
            Message::Pong { echo_timestamp, .. } => {
                let now = (self.clock)();
                let rtt = (now - echo_timestamp) as f32;
                if self.stats.record_rtt(rtt) {
                    // Render delay tracks the connection: twice the RTT,
                    // never below the 100 ms default.
                    let delay = ((self.stats.average_rtt * 2.0) as i64).max(100);
                    self.game.interpolation.set_delay(delay);
                }
            }
            Message::BulletSpawn {
                owner_id,
                x,
                y,
                direction_x,
                direction_y,
                ..
            } => {
                // Only relay ghosts for shots that are not ours; our own
                // shot already spawned its ghost locally.
                if owner_id != self.game.local_player_id() {
                    self.game.apply_bullet_spawn(
                        owner_id,
                        Vec2::new(x, y),
                        Vec2::new(direction_x, direction_y),
                    );
                }
            }
            Message::BulletUpdate { bullets, .. } => {
                self.game.apply_bullet_update(bullets);
            }
            Message::BulletDestroy { bullet_id, .. } => {
                self.game.apply_bullet_destroy(bullet_id);
            }
            Message::PlayerDeath {
                player_id,
                score_penalty,
                ..
            } => {
                self.game.apply_player_death(player_id, score_penalty);
            }
            Message::PlayerRespawn {
                player_id,
                x,
                y,
                health,
                ..
            } => {
                self.game
                    .apply_player_respawn(player_id, Vec2::new(x, y), health);
            }
            other => {
                debug!("ignoring unexpected message: seq {}", other.sequence());
            }
        }
    }

    fn send_join(&mut self) {
        let now = (self.clock)();
        let seq = self.next_sequence();
        let msg = Message::Join {
            name: self.config.player_name.clone(),
            color: self.config.preferred_color.as_str().to_string(),
            timestamp: now,
            sequence: seq,
        };
        self.send_message(&msg);
    }

    fn send_ping(&mut self) {
        let now = (self.clock)();
        let seq = self.next_sequence();
        let msg = Message::Ping {
            timestamp: now,
            sequence: seq,
        };
        self.send_message(&msg);
        self.stats.record_sent(seq, now);
    }

    /// Control-message sequence space (join/ping/shots). Starts at 0 so it
    /// never collides with input sequences, which the server gates and
    /// which start at 1.
    fn next_sequence(&mut self) -> u32 {
        let seq = self.outgoing_sequence;
        self.outgoing_sequence = self.outgoing_sequence.wrapping_add(1);
        seq
    }

    fn send_message(&mut self, msg: &Message) {
        match self.socket.send_to(&msg.encode(), self.server_addr) {
            Ok(_) => {
                self.consecutive_errors = 0;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                self.consecutive_errors += 1;
                warn!(
                    "send failed ({} consecutive): {}",
                    self.consecutive_errors, e
                );
                if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    warn!("connection lost after repeated send failures");
                    self.connected = false;
                }
            }
        }
    }

    /// Forgets the session. No leave message exists on the wire; the
    /// server's idle timeout reaps the slot.
    pub fn disconnect(&mut self) {
        if self.connected {
            info!("disconnecting");
        }
        self.connected = false;
        self.game.clear();
    }
}
