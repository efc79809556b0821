use std::io;
use thiserror::Error;

/// Everything that can go wrong while reading or writing the wire protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("varint is longer than 5 bytes")]
    VarIntTooLong,

    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("payload ended while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("string is not valid utf-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("string of {len} characters exceeds the {max} character limit")]
    StringTooLong { len: usize, max: usize },

    #[error("unknown next state {0} in handshake")]
    InvalidNextState(u32),

    #[error("expected packet {expected:#04x}, got {actual:#04x}")]
    UnexpectedPacket { expected: u32, actual: u32 },

    #[error("frame body of {size} bytes needs compression (threshold {threshold})")]
    CompressionRequired { size: usize, threshold: u32 },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// True when the peer went away rather than sending garbage.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
