use shared::ProtocolError;
use std::io;
use thiserror::Error;

/// Errors local to one connection or session; none of them stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to read frame: {0}")]
    FrameRead(ProtocolError),

    #[error("failed to write frame: {0}")]
    WriteFailure(ProtocolError),

    #[error("malformed packet: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server is full ({max} players), rejected {name}")]
    CapacityExceeded { name: String, max: usize },

    #[error("illegal state transition from {from:?} to {to:?}")]
    IllegalTransition {
        from: crate::connection::ConnectionState,
        to: crate::connection::ConnectionState,
    },

    #[error("broadcast hub is no longer running")]
    HubClosed,

    #[error("failed to bind listener: {0}")]
    Bind(io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
