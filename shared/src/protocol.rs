//! Wire protocol: message schema and binary codec.
//!
//! Every datagram is one message: a 1-byte tag followed by a fixed, ordered
//! concatenation of primitives. Integers are little-endian, floats IEEE-754,
//! booleans a single byte that must be 0 or 1, strings and vectors carry a
//! u32 length/count prefix. Every message terminates with
//! `(timestamp: i64 ms, sequence: u32)`.
//!
//! Decoding is total: any malformed input yields a [`DecodeError`] carrying
//! the failure kind and byte offset, and the caller drops the datagram. No
//! partial state is ever committed, and no control flow runs through panics.

use crate::entities::{BulletKind, EnemyKind};
use std::fmt;

pub const TAG_JOIN: u8 = 1;
pub const TAG_PLAYER_UPDATE: u8 = 3;
pub const TAG_GAME_STATE: u8 = 4;
pub const TAG_ID_ASSIGN: u8 = 6;
pub const TAG_PING: u8 = 7;
pub const TAG_PONG: u8 = 8;
pub const TAG_PLAYER_INPUT: u8 = 9;
pub const TAG_INPUT_ACK: u8 = 10;
pub const TAG_BULLET_SPAWN: u8 = 11;
pub const TAG_BULLET_UPDATE: u8 = 12;
pub const TAG_BULLET_DESTROY: u8 = 13;
pub const TAG_PLAYER_DEATH: u8 = 14;
pub const TAG_PLAYER_RESPAWN: u8 = 15;

/// Largest datagram either side will accept.
pub const MAX_DATAGRAM_SIZE: usize = 8192;

/// Why decoding a datagram failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// The leading tag byte names no known message.
    UnknownTag,
    /// The buffer ended before the field did.
    Truncated,
    /// An enum byte (bool, color, kind, reason) was out of range, or a
    /// length prefix was implausible.
    InvalidEnum,
}

/// Decode failure with the offset of the offending field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub offset: usize,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            DecodeErrorKind::UnknownTag => "unknown message tag",
            DecodeErrorKind::Truncated => "truncated datagram",
            DecodeErrorKind::InvalidEnum => "invalid enum value",
        };
        write!(f, "{} at byte {}", what, self.offset)
    }
}

impl std::error::Error for DecodeError {}

/// Per-player snapshot fields inside a [`Message::GameState`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerData {
    pub player_id: u32,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub body_rotation: f32,
    pub barrel_rotation: f32,
    pub color: String,
    pub moving_forward: bool,
    pub moving_backward: bool,
    pub moving_left: bool,
    pub moving_right: bool,
    pub health: f32,
    pub max_health: f32,
    pub score: i32,
    pub is_dead: bool,
}

/// Per-enemy snapshot fields inside a [`Message::GameState`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnemyData {
    pub enemy_id: u32,
    pub kind: EnemyKind,
    pub x: f32,
    pub y: f32,
    pub body_rotation: f32,
    pub barrel_rotation: f32,
    pub health: f32,
    pub max_health: f32,
}

/// Per-bullet fields inside a [`Message::BulletUpdate`].
#[derive(Debug, Clone, PartialEq)]
pub struct BulletData {
    pub bullet_id: u32,
    pub owner_id: u32,
    pub kind: BulletKind,
    pub x: f32,
    pub y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub rotation: f32,
    pub damage: f32,
    pub lifetime: f32,
    pub spawn_time: i64,
}

/// Why a bullet left the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    Expired,
    HitPlayer,
    HitEnemy,
    HitBorder,
}

impl DestroyReason {
    pub fn from_wire(raw: u8) -> Option<DestroyReason> {
        match raw {
            0 => Some(DestroyReason::Expired),
            1 => Some(DestroyReason::HitPlayer),
            2 => Some(DestroyReason::HitEnemy),
            3 => Some(DestroyReason::HitBorder),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            DestroyReason::Expired => 0,
            DestroyReason::HitPlayer => 1,
            DestroyReason::HitEnemy => 2,
            DestroyReason::HitBorder => 3,
        }
    }
}

/// All message kinds that travel over UDP. Tags 2 (leave) and 5 (player
/// list) are derived events and never appear on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// C->S: request a session with a display name and preferred color.
    Join {
        name: String,
        color: String,
        timestamp: i64,
        sequence: u32,
    },
    /// C->S: legacy full-state update, kept for compatibility.
    PlayerUpdate {
        player_id: u32,
        x: f32,
        y: f32,
        body_rotation: f32,
        barrel_rotation: f32,
        moving_forward: bool,
        moving_backward: bool,
        moving_left: bool,
        moving_right: bool,
        timestamp: i64,
        sequence: u32,
    },
    /// S->C: full snapshot of players and enemies plus the recipient's
    /// last acknowledged input sequence.
    GameState {
        players: Vec<PlayerData>,
        enemies: Vec<EnemyData>,
        last_acked_input: u32,
        timestamp: i64,
        sequence: u32,
    },
    /// S->C: the id assigned to the joining player.
    IdAssign {
        player_id: u32,
        timestamp: i64,
        sequence: u32,
    },
    /// Either direction: RTT probe.
    Ping { timestamp: i64, sequence: u32 },
    /// Either direction: RTT probe response echoing the probe's timestamp.
    Pong {
        echo_timestamp: i64,
        timestamp: i64,
        sequence: u32,
    },
    /// C->S: lightweight input with the client-authoritative barrel angle.
    PlayerInput {
        player_id: u32,
        moving_forward: bool,
        moving_backward: bool,
        moving_left: bool,
        moving_right: bool,
        barrel_rotation: f32,
        timestamp: i64,
        sequence: u32,
    },
    /// S->C: confirms the last processed input sequence.
    InputAck {
        player_id: u32,
        acked_sequence: u32,
        timestamp: i64,
        sequence: u32,
    },
    /// C->S: shoot request; S->C: broadcast for enemy shots.
    BulletSpawn {
        owner_id: u32,
        x: f32,
        y: f32,
        direction_x: f32,
        direction_y: f32,
        barrel_rotation: f32,
        timestamp: i64,
        sequence: u32,
    },
    /// S->C: positions and velocities of every live bullet.
    BulletUpdate {
        bullets: Vec<BulletData>,
        timestamp: i64,
        sequence: u32,
    },
    /// S->C: a bullet left the world.
    BulletDestroy {
        bullet_id: u32,
        reason: DestroyReason,
        hit_target_id: u32,
        x: f32,
        y: f32,
        timestamp: i64,
        sequence: u32,
    },
    /// S->C: a player died.
    PlayerDeath {
        player_id: u32,
        killer_id: u32,
        x: f32,
        y: f32,
        score_penalty: i32,
        timestamp: i64,
        sequence: u32,
    },
    /// S->C: a player respawned.
    PlayerRespawn {
        player_id: u32,
        x: f32,
        y: f32,
        health: f32,
        timestamp: i64,
        sequence: u32,
    },
}

impl Message {
    pub fn timestamp(&self) -> i64 {
        match self {
            Message::Join { timestamp, .. }
            | Message::PlayerUpdate { timestamp, .. }
            | Message::GameState { timestamp, .. }
            | Message::IdAssign { timestamp, .. }
            | Message::Ping { timestamp, .. }
            | Message::Pong { timestamp, .. }
            | Message::PlayerInput { timestamp, .. }
            | Message::InputAck { timestamp, .. }
            | Message::BulletSpawn { timestamp, .. }
            | Message::BulletUpdate { timestamp, .. }
            | Message::BulletDestroy { timestamp, .. }
            | Message::PlayerDeath { timestamp, .. }
            | Message::PlayerRespawn { timestamp, .. } => *timestamp,
        }
    }

    pub fn sequence(&self) -> u32 {
        match self {
            Message::Join { sequence, .. }
            | Message::PlayerUpdate { sequence, .. }
            | Message::GameState { sequence, .. }
            | Message::IdAssign { sequence, .. }
            | Message::Ping { sequence, .. }
            | Message::Pong { sequence, .. }
            | Message::PlayerInput { sequence, .. }
            | Message::InputAck { sequence, .. }
            | Message::BulletSpawn { sequence, .. }
            | Message::BulletUpdate { sequence, .. }
            | Message::BulletDestroy { sequence, .. }
            | Message::PlayerDeath { sequence, .. }
            | Message::PlayerRespawn { sequence, .. } => *sequence,
        }
    }

    /// Serializes the message into a fresh datagram buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            Message::Join {
                name,
                color,
                timestamp,
                sequence,
            } => {
                w.u8(TAG_JOIN);
                w.string(name);
                w.string(color);
                w.trailer(*timestamp, *sequence);
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
                w.u8(TAG_PLAYER_UPDATE);
                w.u32(*player_id);
                w.f32(*x);
                w.f32(*y);
                w.f32(*body_rotation);
                w.f32(*barrel_rotation);
                w.bool(*moving_forward);
                w.bool(*moving_backward);
                w.bool(*moving_left);
                w.bool(*moving_right);
                w.trailer(*timestamp, *sequence);
            }
            Message::GameState {
                players,
                enemies,
                last_acked_input,
                timestamp,
                sequence,
            } => {
                w.u8(TAG_GAME_STATE);
                w.u32(players.len() as u32);
                for p in players {
                    w.player(p);
                }
                w.u32(enemies.len() as u32);
                for e in enemies {
                    w.enemy(e);
                }
                w.u32(*last_acked_input);
                w.trailer(*timestamp, *sequence);
            }
            Message::IdAssign {
                player_id,
                timestamp,
                sequence,
            } => {
                w.u8(TAG_ID_ASSIGN);
                w.u32(*player_id);
                w.trailer(*timestamp, *sequence);
            }
            Message::Ping {
                timestamp,
                sequence,
            } => {
                w.u8(TAG_PING);
                w.trailer(*timestamp, *sequence);
            }
            Message::Pong {
                echo_timestamp,
                timestamp,
                sequence,
            } => {
                w.u8(TAG_PONG);
                w.i64(*echo_timestamp);
                w.trailer(*timestamp, *sequence);
            }
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
                w.u8(TAG_PLAYER_INPUT);
                w.u32(*player_id);
                w.bool(*moving_forward);
                w.bool(*moving_backward);
                w.bool(*moving_left);
                w.bool(*moving_right);
                w.f32(*barrel_rotation);
                w.trailer(*timestamp, *sequence);
            }
            Message::InputAck {
                player_id,
                acked_sequence,
                timestamp,
                sequence,
            } => {
                w.u8(TAG_INPUT_ACK);
                w.u32(*player_id);
                w.u32(*acked_sequence);
                w.trailer(*timestamp, *sequence);
            }
            Message::BulletSpawn {
                owner_id,
                x,
                y,
                direction_x,
                direction_y,
                barrel_rotation,
                timestamp,
                sequence,
            } => {
                w.u8(TAG_BULLET_SPAWN);
                w.u32(*owner_id);
                w.f32(*x);
                w.f32(*y);
                w.f32(*direction_x);
                w.f32(*direction_y);
                w.f32(*barrel_rotation);
                w.trailer(*timestamp, *sequence);
            }
            Message::BulletUpdate {
                bullets,
                timestamp,
                sequence,
            } => {
                w.u8(TAG_BULLET_UPDATE);
                w.u32(bullets.len() as u32);
                for b in bullets {
                    w.bullet(b);
                }
                w.trailer(*timestamp, *sequence);
            }
            Message::BulletDestroy {
                bullet_id,
                reason,
                hit_target_id,
                x,
                y,
                timestamp,
                sequence,
            } => {
                w.u8(TAG_BULLET_DESTROY);
                w.u32(*bullet_id);
                w.u8(reason.to_wire());
                w.u32(*hit_target_id);
                w.f32(*x);
                w.f32(*y);
                w.trailer(*timestamp, *sequence);
            }
            Message::PlayerDeath {
                player_id,
                killer_id,
                x,
                y,
                score_penalty,
                timestamp,
                sequence,
            } => {
                w.u8(TAG_PLAYER_DEATH);
                w.u32(*player_id);
                w.u32(*killer_id);
                w.f32(*x);
                w.f32(*y);
                w.i32(*score_penalty);
                w.trailer(*timestamp, *sequence);
            }
            Message::PlayerRespawn {
                player_id,
                x,
                y,
                health,
                timestamp,
                sequence,
            } => {
                w.u8(TAG_PLAYER_RESPAWN);
                w.u32(*player_id);
                w.f32(*x);
                w.f32(*y);
                w.f32(*health);
                w.trailer(*timestamp, *sequence);
            }
        }
        w.into_bytes()
    }

    /// Parses one datagram. Inverse of [`Message::encode`] for every
    /// well-formed buffer.
    pub fn decode(buf: &[u8]) -> Result<Message, DecodeError> {
        let mut r = Reader::new(buf);
        let tag = r.u8()?;
        let msg = match tag {
            TAG_JOIN => {
                let name = r.string()?;
                let color = r.string()?;
                let (timestamp, sequence) = r.trailer()?;
                Message::Join {
                    name,
                    color,
                    timestamp,
                    sequence,
                }
            }
            TAG_PLAYER_UPDATE => {
                let player_id = r.u32()?;
                let x = r.f32()?;
                let y = r.f32()?;
                let body_rotation = r.f32()?;
                let barrel_rotation = r.f32()?;
                let moving_forward = r.bool()?;
                let moving_backward = r.bool()?;
                let moving_left = r.bool()?;
                let moving_right = r.bool()?;
                let (timestamp, sequence) = r.trailer()?;
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
                }
            }
            TAG_GAME_STATE => {
                let player_count = r.count()?;
                let mut players = Vec::with_capacity(player_count);
                for _ in 0..player_count {
                    players.push(r.player()?);
                }
                let enemy_count = r.count()?;
                let mut enemies = Vec::with_capacity(enemy_count);
                for _ in 0..enemy_count {
                    enemies.push(r.enemy()?);
                }
                let last_acked_input = r.u32()?;
                let (timestamp, sequence) = r.trailer()?;
                Message::GameState {
                    players,
                    enemies,
                    last_acked_input,
                    timestamp,
                    sequence,
                }
            }
            TAG_ID_ASSIGN => {
                let player_id = r.u32()?;
                let (timestamp, sequence) = r.trailer()?;
                Message::IdAssign {
                    player_id,
                    timestamp,
                    sequence,
                }
            }
            TAG_PING => {
                let (timestamp, sequence) = r.trailer()?;
                Message::Ping {
                    timestamp,
                    sequence,
                }
            }
            TAG_PONG => {
                let echo_timestamp = r.i64()?;
                let (timestamp, sequence) = r.trailer()?;
                Message::Pong {
                    echo_timestamp,
                    timestamp,
                    sequence,
                }
            }
            TAG_PLAYER_INPUT => {
                let player_id = r.u32()?;
                let moving_forward = r.bool()?;
                let moving_backward = r.bool()?;
                let moving_left = r.bool()?;
                let moving_right = r.bool()?;
                let barrel_rotation = r.f32()?;
                let (timestamp, sequence) = r.trailer()?;
                Message::PlayerInput {
                    player_id,
                    moving_forward,
                    moving_backward,
                    moving_left,
                    moving_right,
                    barrel_rotation,
                    timestamp,
                    sequence,
                }
            }
            TAG_INPUT_ACK => {
                let player_id = r.u32()?;
                let acked_sequence = r.u32()?;
                let (timestamp, sequence) = r.trailer()?;
                Message::InputAck {
                    player_id,
                    acked_sequence,
                    timestamp,
                    sequence,
                }
            }
            TAG_BULLET_SPAWN => {
                let owner_id = r.u32()?;
                let x = r.f32()?;
                let y = r.f32()?;
                let direction_x = r.f32()?;
                let direction_y = r.f32()?;
                let barrel_rotation = r.f32()?;
                let (timestamp, sequence) = r.trailer()?;
                Message::BulletSpawn {
                    owner_id,
                    x,
                    y,
                    direction_x,
                    direction_y,
                    barrel_rotation,
                    timestamp,
                    sequence,
                }
            }
            TAG_BULLET_UPDATE => {
                let count = r.count()?;
                let mut bullets = Vec::with_capacity(count);
                for _ in 0..count {
                    bullets.push(r.bullet()?);
                }
                let (timestamp, sequence) = r.trailer()?;
                Message::BulletUpdate {
                    bullets,
                    timestamp,
                    sequence,
                }
            }
            TAG_BULLET_DESTROY => {
                let bullet_id = r.u32()?;
                let reason = r.destroy_reason()?;
                let hit_target_id = r.u32()?;
                let x = r.f32()?;
                let y = r.f32()?;
                let (timestamp, sequence) = r.trailer()?;
                Message::BulletDestroy {
                    bullet_id,
                    reason,
                    hit_target_id,
                    x,
                    y,
                    timestamp,
                    sequence,
                }
            }
            TAG_PLAYER_DEATH => {
                let player_id = r.u32()?;
                let killer_id = r.u32()?;
                let x = r.f32()?;
                let y = r.f32()?;
                let score_penalty = r.i32()?;
                let (timestamp, sequence) = r.trailer()?;
                Message::PlayerDeath {
                    player_id,
                    killer_id,
                    x,
                    y,
                    score_penalty,
                    timestamp,
                    sequence,
                }
            }
            TAG_PLAYER_RESPAWN => {
                let player_id = r.u32()?;
                let x = r.f32()?;
                let y = r.f32()?;
                let health = r.f32()?;
                let (timestamp, sequence) = r.trailer()?;
                Message::PlayerRespawn {
                    player_id,
                    x,
                    y,
                    health,
                    timestamp,
                    sequence,
                }
            }
            _ => {
                return Err(DecodeError {
                    kind: DecodeErrorKind::UnknownTag,
                    offset: 0,
                })
            }
        };
        Ok(msg)
    }
}

/// Append-only little-endian byte writer.
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Writer { buf: Vec::with_capacity(128) }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn string(&mut self, v: &str) {
        self.u32(v.len() as u32);
        self.buf.extend_from_slice(v.as_bytes());
    }

    fn trailer(&mut self, timestamp: i64, sequence: u32) {
        self.i64(timestamp);
        self.u32(sequence);
    }

    fn player(&mut self, p: &PlayerData) {
        self.u32(p.player_id);
        self.string(&p.name);
        self.f32(p.x);
        self.f32(p.y);
        self.f32(p.body_rotation);
        self.f32(p.barrel_rotation);
        self.string(&p.color);
        self.bool(p.moving_forward);
        self.bool(p.moving_backward);
        self.bool(p.moving_left);
        self.bool(p.moving_right);
        self.f32(p.health);
        self.f32(p.max_health);
        self.i32(p.score);
        self.bool(p.is_dead);
    }

    fn enemy(&mut self, e: &EnemyData) {
        self.u32(e.enemy_id);
        self.u8(e.kind.to_wire());
        self.f32(e.x);
        self.f32(e.y);
        self.f32(e.body_rotation);
        self.f32(e.barrel_rotation);
        self.f32(e.health);
        self.f32(e.max_health);
    }

    fn bullet(&mut self, b: &BulletData) {
        self.u32(b.bullet_id);
        self.u32(b.owner_id);
        self.u8(b.kind.to_wire());
        self.f32(b.x);
        self.f32(b.y);
        self.f32(b.velocity_x);
        self.f32(b.velocity_y);
        self.f32(b.rotation);
        self.f32(b.damage);
        self.f32(b.lifetime);
        self.i64(b.spawn_time);
    }
}

/// Bounds-checked little-endian byte reader that remembers the offset of
/// the field it is currently parsing.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.buf.len() {
            return Err(DecodeError {
                kind: DecodeErrorKind::Truncated,
                offset: self.pos,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool, DecodeError> {
        let offset = self.pos;
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError {
                kind: DecodeErrorKind::InvalidEnum,
                offset,
            }),
        }
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(arr))
    }

    fn f32(&mut self) -> Result<f32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let offset = self.pos;
        let len = self.u32()? as usize;
        if len > MAX_DATAGRAM_SIZE {
            return Err(DecodeError {
                kind: DecodeErrorKind::InvalidEnum,
                offset,
            });
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError {
            kind: DecodeErrorKind::InvalidEnum,
            offset,
        })
    }

    /// A count prefix for repeated fields; rejected when it could not
    /// possibly fit in the remaining buffer.
    fn count(&mut self) -> Result<usize, DecodeError> {
        let offset = self.pos;
        let n = self.u32()? as usize;
        if n > self.buf.len() {
            return Err(DecodeError {
                kind: DecodeErrorKind::InvalidEnum,
                offset,
            });
        }
        Ok(n)
    }

    fn trailer(&mut self) -> Result<(i64, u32), DecodeError> {
        let timestamp = self.i64()?;
        let sequence = self.u32()?;
        Ok((timestamp, sequence))
    }

    fn destroy_reason(&mut self) -> Result<DestroyReason, DecodeError> {
        let offset = self.pos;
        DestroyReason::from_wire(self.u8()?).ok_or(DecodeError {
            kind: DecodeErrorKind::InvalidEnum,
            offset,
        })
    }

    fn player(&mut self) -> Result<PlayerData, DecodeError> {
        Ok(PlayerData {
            player_id: self.u32()?,
            name: self.string()?,
            x: self.f32()?,
            y: self.f32()?,
            body_rotation: self.f32()?,
            barrel_rotation: self.f32()?,
            color: self.string()?,
            moving_forward: self.bool()?,
            moving_backward: self.bool()?,
            moving_left: self.bool()?,
            moving_right: self.bool()?,
            health: self.f32()?,
            max_health: self.f32()?,
            score: self.i32()?,
            is_dead: self.bool()?,
        })
    }

    fn enemy(&mut self) -> Result<EnemyData, DecodeError> {
        let enemy_id = self.u32()?;
        let offset = self.pos;
        let kind = EnemyKind::from_wire(self.u8()?).ok_or(DecodeError {
            kind: DecodeErrorKind::InvalidEnum,
            offset,
        })?;
        Ok(EnemyData {
            enemy_id,
            kind,
            x: self.f32()?,
            y: self.f32()?,
            body_rotation: self.f32()?,
            barrel_rotation: self.f32()?,
            health: self.f32()?,
            max_health: self.f32()?,
        })
    }

    fn bullet(&mut self) -> Result<BulletData, DecodeError> {
        let bullet_id = self.u32()?;
        let owner_id = self.u32()?;
        let offset = self.pos;
        let kind = BulletKind::from_wire(self.u8()?).ok_or(DecodeError {
            kind: DecodeErrorKind::InvalidEnum,
            offset,
        })?;
        Ok(BulletData {
            bullet_id,
            owner_id,
            kind,
            x: self.f32()?,
            y: self.f32()?,
            velocity_x: self.f32()?,
            velocity_y: self.f32()?,
            rotation: self.f32()?,
            damage: self.f32()?,
            lifetime: self.f32()?,
            spawn_time: self.i64()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_player() -> PlayerData {
        PlayerData {
            player_id: 1,
            name: "Ada".into(),
            x: 640.0,
            y: 480.0,
            body_rotation: 90.0,
            barrel_rotation: 45.5,
            color: "blue".into(),
            moving_forward: true,
            moving_backward: false,
            moving_left: false,
            moving_right: true,
            health: 75.0,
            max_health: 100.0,
            score: -5,
            is_dead: false,
        }
    }

    fn sample_enemy() -> EnemyData {
        EnemyData {
            enemy_id: 1001,
            kind: EnemyKind::Purple,
            x: 200.0,
            y: 300.0,
            body_rotation: 10.0,
            barrel_rotation: 350.0,
            health: 42.0,
            max_health: 60.0,
        }
    }

    fn sample_bullet() -> BulletData {
        BulletData {
            bullet_id: 10_001,
            owner_id: 1001,
            kind: BulletKind::EnemyStandard,
            x: 150.0,
            y: 160.0,
            velocity_x: 450.0,
            velocity_y: 0.0,
            rotation: 0.0,
            damage: 20.0,
            lifetime: 2.5,
            spawn_time: 123_456,
        }
    }

    fn roundtrip(msg: Message) {
        let bytes = msg.encode();
        let decoded = Message::decode(&bytes).expect("decode");
        assert_eq!(msg, decoded);
    }

    #[test]
    fn join_roundtrip() {
        roundtrip(Message::Join {
            name: "Ada".into(),
            color: "blue".into(),
            timestamp: 1000,
            sequence: 1,
        });
    }

    #[test]
    fn player_update_roundtrip() {
        roundtrip(Message::PlayerUpdate {
            player_id: 7,
            x: 100.5,
            y: 200.25,
            body_rotation: 359.9,
            barrel_rotation: 0.1,
            moving_forward: true,
            moving_backward: false,
            moving_left: true,
            moving_right: false,
            timestamp: 99,
            sequence: 12,
        });
    }

    #[test]
    fn game_state_roundtrip() {
        roundtrip(Message::GameState {
            players: vec![sample_player()],
            enemies: vec![sample_enemy()],
            last_acked_input: 41,
            timestamp: 5555,
            sequence: 6,
        });
    }

    #[test]
    fn empty_game_state_roundtrip() {
        roundtrip(Message::GameState {
            players: vec![],
            enemies: vec![],
            last_acked_input: 0,
            timestamp: 1,
            sequence: 1,
        });
    }

    #[test]
    fn id_assign_roundtrip() {
        roundtrip(Message::IdAssign {
            player_id: 1,
            timestamp: 10,
            sequence: 1,
        });
    }

    #[test]
    fn ping_pong_roundtrip() {
        roundtrip(Message::Ping {
            timestamp: 777,
            sequence: 3,
        });
        roundtrip(Message::Pong {
            echo_timestamp: 777,
            timestamp: 790,
            sequence: 3,
        });
    }

    #[test]
    fn player_input_roundtrip() {
        roundtrip(Message::PlayerInput {
            player_id: 1,
            moving_forward: true,
            moving_backward: false,
            moving_left: false,
            moving_right: false,
            barrel_rotation: 123.4,
            timestamp: 1100,
            sequence: 7,
        });
    }

    #[test]
    fn input_ack_roundtrip() {
        roundtrip(Message::InputAck {
            player_id: 1,
            acked_sequence: 7,
            timestamp: 1105,
            sequence: 2,
        });
    }

    #[test]
    fn bullet_messages_roundtrip() {
        roundtrip(Message::BulletSpawn {
            owner_id: 1,
            x: 670.0,
            y: 480.0,
            direction_x: 1.0,
            direction_y: 0.0,
            barrel_rotation: 0.0,
            timestamp: 2000,
            sequence: 9,
        });
        roundtrip(Message::BulletUpdate {
            bullets: vec![sample_bullet()],
            timestamp: 2033,
            sequence: 10,
        });
        roundtrip(Message::BulletDestroy {
            bullet_id: 10_001,
            reason: DestroyReason::HitEnemy,
            hit_target_id: 1001,
            x: 400.0,
            y: 300.0,
            timestamp: 2100,
            sequence: 11,
        });
    }

    #[test]
    fn death_and_respawn_roundtrip() {
        roundtrip(Message::PlayerDeath {
            player_id: 1,
            killer_id: 0,
            x: 500.0,
            y: 500.0,
            score_penalty: 100,
            timestamp: 3000,
            sequence: 12,
        });
        roundtrip(Message::PlayerRespawn {
            player_id: 1,
            x: 200.0,
            y: 600.0,
            health: 100.0,
            timestamp: 8000,
            sequence: 13,
        });
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = Message::decode(&[200, 0, 0]).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnknownTag);
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn reserved_tags_are_rejected() {
        for tag in [0u8, 2, 5, 16] {
            let err = Message::decode(&[tag]).unwrap_err();
            assert_eq!(err.kind, DecodeErrorKind::UnknownTag);
        }
    }

    #[test]
    fn truncation_reports_offset() {
        let full = Message::Ping {
            timestamp: 1,
            sequence: 1,
        }
        .encode();
        for cut in 1..full.len() {
            let err = Message::decode(&full[..cut]).unwrap_err();
            assert_eq!(err.kind, DecodeErrorKind::Truncated);
            assert!(err.offset <= cut);
        }
    }

    #[test]
    fn every_variant_survives_truncation_at_any_point() {
        let msgs = vec![
            Message::Join {
                name: "Ada".into(),
                color: "red".into(),
                timestamp: 1,
                sequence: 1,
            },
            Message::GameState {
                players: vec![sample_player()],
                enemies: vec![sample_enemy()],
                last_acked_input: 1,
                timestamp: 1,
                sequence: 1,
            },
            Message::BulletUpdate {
                bullets: vec![sample_bullet()],
                timestamp: 1,
                sequence: 1,
            },
        ];
        for msg in msgs {
            let full = msg.encode();
            for cut in 0..full.len() {
                assert!(Message::decode(&full[..cut]).is_err());
            }
        }
    }

    #[test]
    fn invalid_bool_is_invalid_enum() {
        let mut bytes = Message::PlayerInput {
            player_id: 1,
            moving_forward: false,
            moving_backward: false,
            moving_left: false,
            moving_right: false,
            barrel_rotation: 0.0,
            timestamp: 1,
            sequence: 1,
        }
        .encode();
        // First bool sits right after the tag and player id.
        bytes[5] = 2;
        let err = Message::decode(&bytes).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidEnum);
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn invalid_enemy_kind_is_invalid_enum() {
        let mut bytes = Message::GameState {
            players: vec![],
            enemies: vec![sample_enemy()],
            last_acked_input: 0,
            timestamp: 1,
            sequence: 1,
        }
        .encode();
        // Tag(1) + player count(4) + enemy count(4) + enemy id(4) => kind byte.
        bytes[13] = 9;
        let err = Message::decode(&bytes).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidEnum);
    }

    #[test]
    fn absurd_count_prefix_is_rejected() {
        let mut bytes = Message::BulletUpdate {
            bullets: vec![],
            timestamp: 1,
            sequence: 1,
        }
        .encode();
        bytes[1..5].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = Message::decode(&bytes).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidEnum);
    }

    #[test]
    fn trailer_accessors_match_fields() {
        let msg = Message::InputAck {
            player_id: 4,
            acked_sequence: 9,
            timestamp: 42,
            sequence: 17,
        };
        assert_eq!(msg.timestamp(), 42);
        assert_eq!(msg.sequence(), 17);
    }
}
