//! Typed payloads for every packet the server reads or writes.
//!
//! Packet ids are only unique within one connection state, so each type
//! carries its own id and the caller decides which types are legal when.

use crate::codec::Frame;
use crate::error::ProtocolError;
use crate::varint::{get_varint, put_varint};
use crate::{MAX_STRING_LEN, TICKS_PER_DAY};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

pub mod ids {
    // handshake
    pub const HANDSHAKE: u32 = 0x00;

    // status
    pub const STATUS_REQUEST: u32 = 0x00;
    pub const STATUS_RESPONSE: u32 = 0x00;
    pub const PING: u32 = 0x01;
    pub const PONG: u32 = 0x01;

    // login
    pub const LOGIN_START: u32 = 0x00;
    pub const LOGIN_SUCCESS: u32 = 0x02;
    pub const SET_COMPRESSION: u32 = 0x03;

    // play, serverbound
    pub const CHAT_REQUEST: u32 = 0x01;

    // play, clientbound
    pub const KEEP_ALIVE: u32 = 0x00;
    pub const JOIN_GAME: u32 = 0x01;
    pub const CHAT_MESSAGE: u32 = 0x02;
    pub const TIME_UPDATE: u32 = 0x03;
    pub const SPAWN_POSITION: u32 = 0x05;
    pub const POSITION_AND_LOOK: u32 = 0x08;
}

pub const MAX_USERNAME_LEN: usize = 16;
pub const MAX_CHAT_LEN: usize = 100;
const MAX_ADDRESS_LEN: usize = 255;

/// Placeholder player UUID handed to every login; there is no account lookup.
pub const OFFLINE_UUID: &str = "de305d54-75b4-431b-adb2-eb6b9e546013";

pub trait Packet: Sized {
    const ID: u32;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError>;

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError>;

    fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(Frame::new(Self::ID, buf.freeze()))
    }

    fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        if frame.id != Self::ID {
            return Err(ProtocolError::UnexpectedPacket {
                expected: Self::ID,
                actual: frame.id,
            });
        }
        let mut payload = frame.payload.clone();
        Self::decode(&mut payload)
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn ensure(buf: &Bytes, len: usize, what: &'static str) -> Result<(), ProtocolError> {
    if buf.remaining() < len {
        Err(ProtocolError::UnexpectedEof(what))
    } else {
        Ok(())
    }
}

/// Varint byte length followed by UTF-8; `max_chars` is checked on both
/// the raw length and the decoded character count.
pub fn get_string(buf: &mut Bytes, max_chars: usize) -> Result<String, ProtocolError> {
    let len = get_varint(buf)? as usize;
    if len > max_chars * 4 {
        return Err(ProtocolError::StringTooLong {
            len,
            max: max_chars,
        });
    }
    ensure(buf, len, "string")?;

    let text = String::from_utf8(buf.split_to(len).to_vec())?;
    let chars = text.chars().count();
    if chars > max_chars {
        return Err(ProtocolError::StringTooLong {
            len: chars,
            max: max_chars,
        });
    }
    Ok(text)
}

pub fn put_string(buf: &mut BytesMut, text: &str) {
    put_varint(buf, text.len() as u32);
    buf.put_slice(text.as_bytes());
}

fn get_u8(buf: &mut Bytes, what: &'static str) -> Result<u8, ProtocolError> {
    ensure(buf, 1, what)?;
    Ok(buf.get_u8())
}

fn get_i32(buf: &mut Bytes, what: &'static str) -> Result<i32, ProtocolError> {
    ensure(buf, 4, what)?;
    Ok(buf.get_i32())
}

fn get_i64(buf: &mut Bytes, what: &'static str) -> Result<i64, ProtocolError> {
    ensure(buf, 8, what)?;
    Ok(buf.get_i64())
}

fn get_f32(buf: &mut Bytes, what: &'static str) -> Result<f32, ProtocolError> {
    ensure(buf, 4, what)?;
    Ok(buf.get_f32())
}

fn get_f64(buf: &mut Bytes, what: &'static str) -> Result<f64, ProtocolError> {
    ensure(buf, 8, what)?;
    Ok(buf.get_f64())
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Status = 1,
    Login = 2,
}

impl TryFrom<u32> for NextState {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(NextState::Status),
            2 => Ok(NextState::Login),
            other => Err(ProtocolError::InvalidNextState(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: u32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: NextState,
}

impl Packet for Handshake {
    const ID: u32 = ids::HANDSHAKE;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        put_varint(buf, self.protocol_version);
        put_string(buf, &self.server_address);
        buf.put_u16(self.server_port);
        put_varint(buf, self.next_state as u32);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let protocol_version = get_varint(buf)?;
        let server_address = get_string(buf, MAX_ADDRESS_LEN)?;
        ensure(buf, 2, "server port")?;
        let server_port = buf.get_u16();
        let next_state = NextState::try_from(get_varint(buf)?)?;
        Ok(Self {
            protocol_version,
            server_address,
            server_port,
            next_state,
        })
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub name: String,
    pub protocol: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Players {
    pub max: usize,
    pub online: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub text: String,
}

/// The JSON document answered to a status request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub version: Version,
    pub players: Players,
    pub description: Description,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequest;

impl Packet for StatusRequest {
    const ID: u32 = ids::STATUS_REQUEST;

    fn encode(&self, _buf: &mut BytesMut) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn decode(_buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(StatusRequest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: Status,
}

impl Packet for StatusResponse {
    const ID: u32 = ids::STATUS_RESPONSE;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        put_string(buf, &serde_json::to_string(&self.status)?);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let json = get_string(buf, MAX_STRING_LEN)?;
        Ok(Self {
            status: serde_json::from_str(&json)?,
        })
    }
}

/// Latency probe; the server echoes the payload bytes untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub payload: i64,
}

impl Packet for Ping {
    const ID: u32 = ids::PING;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_i64(self.payload);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            payload: get_i64(buf, "ping payload")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub username: String,
}

impl Packet for LoginStart {
    const ID: u32 = ids::LOGIN_START;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        put_string(buf, &self.username);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            username: get_string(buf, MAX_USERNAME_LEN)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    pub uuid: String,
    pub username: String,
}

impl Packet for LoginSuccess {
    const ID: u32 = ids::LOGIN_SUCCESS;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        put_string(buf, &self.uuid);
        put_string(buf, &self.username);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            uuid: get_string(buf, 36)?,
            username: get_string(buf, MAX_USERNAME_LEN)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCompression {
    pub threshold: u32,
}

impl Packet for SetCompression {
    const ID: u32 = ids::SET_COMPRESSION;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        put_varint(buf, self.threshold);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            threshold: get_varint(buf)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Play
// ---------------------------------------------------------------------------

/// Chat line typed by a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
}

impl Packet for ChatRequest {
    const ID: u32 = ids::CHAT_REQUEST;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        put_string(buf, &self.message);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        // Longer lines are accepted here and cut down by the caller.
        Ok(Self {
            message: get_string(buf, MAX_STRING_LEN)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ChatComponent {
    text: String,
}

/// Chat line shown to a player, sent as a JSON text component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: String,
    pub position: u8,
}

impl ChatMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            position: 0,
        }
    }
}

impl Packet for ChatMessage {
    const ID: u32 = ids::CHAT_MESSAGE;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let component = ChatComponent {
            text: self.text.clone(),
        };
        put_string(buf, &serde_json::to_string(&component)?);
        buf.put_u8(self.position);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let json = get_string(buf, MAX_STRING_LEN)?;
        let component: ChatComponent = serde_json::from_str(&json)?;
        Ok(Self {
            text: component.text,
            position: get_u8(buf, "chat position")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub id: u32,
}

impl Packet for KeepAlive {
    const ID: u32 = ids::KEEP_ALIVE;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        put_varint(buf, self.id);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: get_varint(buf)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUpdate {
    pub world_age: i64,
    pub time_of_day: i64,
}

impl TimeUpdate {
    pub fn from_ticks(ticks: i64) -> Self {
        Self {
            world_age: ticks,
            time_of_day: ticks % TICKS_PER_DAY,
        }
    }
}

impl Packet for TimeUpdate {
    const ID: u32 = ids::TIME_UPDATE;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_i64(self.world_age);
        buf.put_i64(self.time_of_day);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            world_age: get_i64(buf, "world age")?,
            time_of_day: get_i64(buf, "time of day")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGame {
    pub entity_id: i32,
    pub gamemode: u8,
    pub dimension: i8,
    pub difficulty: u8,
    pub max_players: u8,
    pub level_type: String,
    pub reduced_debug_info: bool,
}

impl JoinGame {
    pub fn new(entity_id: i32, max_players: usize) -> Self {
        Self {
            entity_id,
            gamemode: 1,
            dimension: 0,
            difficulty: 0,
            max_players: max_players.min(u8::MAX as usize) as u8,
            level_type: "default".to_string(),
            reduced_debug_info: false,
        }
    }
}

impl Packet for JoinGame {
    const ID: u32 = ids::JOIN_GAME;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_i32(self.entity_id);
        buf.put_u8(self.gamemode);
        buf.put_i8(self.dimension);
        buf.put_u8(self.difficulty);
        buf.put_u8(self.max_players);
        put_string(buf, &self.level_type);
        buf.put_u8(self.reduced_debug_info as u8);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            entity_id: get_i32(buf, "entity id")?,
            gamemode: get_u8(buf, "gamemode")?,
            dimension: get_u8(buf, "dimension")? as i8,
            difficulty: get_u8(buf, "difficulty")?,
            max_players: get_u8(buf, "max players")?,
            level_type: get_string(buf, 16)?,
            reduced_debug_info: get_u8(buf, "reduced debug info")? != 0,
        })
    }
}

/// Block position packed as 26/12/26 bits into one i64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnPosition {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl SpawnPosition {
    pub fn pack(&self) -> i64 {
        ((self.x as i64 & 0x3FF_FFFF) << 38)
            | ((self.y as i64 & 0xFFF) << 26)
            | (self.z as i64 & 0x3FF_FFFF)
    }

    pub fn unpack(packed: i64) -> Self {
        Self {
            x: (packed >> 38) as i32,
            y: ((packed << 26) >> 52) as i32,
            z: ((packed << 38) >> 38) as i32,
        }
    }
}

impl Packet for SpawnPosition {
    const ID: u32 = ids::SPAWN_POSITION;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_i64(self.pack());
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self::unpack(get_i64(buf, "position")?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionAndLook {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub flags: u8,
}

impl PositionAndLook {
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
            flags: 0,
        }
    }
}

impl Packet for PositionAndLook {
    const ID: u32 = ids::POSITION_AND_LOOK;

    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_f64(self.x);
        buf.put_f64(self.y);
        buf.put_f64(self.z);
        buf.put_f32(self.yaw);
        buf.put_f32(self.pitch);
        buf.put_u8(self.flags);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            x: get_f64(buf, "x")?,
            y: get_f64(buf, "y")?,
            z: get_f64(buf, "z")?,
            yaw: get_f32(buf, "yaw")?,
            pitch: get_f32(buf, "pitch")?,
            flags: get_u8(buf, "flags")?,
        })
    }
}
