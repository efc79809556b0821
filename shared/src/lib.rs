pub mod codec;
pub mod error;
pub mod packets;
pub mod varint;

pub use codec::{read_frame, write_frame, Frame, FrameCodec};
pub use error::ProtocolError;
pub use packets::{
    ids, ChatMessage, ChatRequest, Description, Handshake, JoinGame, KeepAlive, LoginStart,
    LoginSuccess, NextState, Packet, Ping, Players, PositionAndLook, SetCompression,
    SpawnPosition, Status, StatusRequest, StatusResponse, TimeUpdate, Version,
    MAX_CHAT_LEN, MAX_USERNAME_LEN, OFFLINE_UUID,
};

pub const VERSION_NAME: &str = "1.8.9";
pub const PROTOCOL_VERSION: u32 = 47;

/// Largest frame body either side may send (a 3-byte varint length).
pub const MAX_FRAME_SIZE: usize = 2_097_151;
pub const MAX_STRING_LEN: usize = 32_767;

/// Threshold announced after login; frames below it travel uncompressed.
pub const DEFAULT_COMPRESSION_THRESHOLD: u32 = 65_536;

pub const TICKS_PER_DAY: i64 = 24_000;
pub const TICKS_PER_SECOND: i64 = 20;
